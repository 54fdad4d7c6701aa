// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UPnP device-description parsing.
//!
//! The description document is fetched from the SSDP `LOCATION` URL. Only
//! the first occurrence of each interesting element is taken; nesting and
//! namespaces are ignored the way UPnP stacks in the field require.

use super::resolve_url;
use roxmltree::Document;

/// Device metadata and service URLs from a description document.
///
/// Metadata fields are opaque text for logging and UI. The three service
/// URLs are resolved to absolute form against the description's own URL.
#[derive(Debug, Default, Clone)]
pub struct DeviceDescription {
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub manufacturer_url: Option<String>,
    pub model_description: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub udn: Option<String>,
    pub upc: Option<String>,
    pub scpd_url: Option<String>,
    pub control_url: Option<String>,
    pub event_sub_url: Option<String>,
}

fn first_item(doc: &Document, tag: &str) -> Option<String> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == tag)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Parse a device description body.
///
/// `location` is the URL the document was fetched from; relative service
/// URLs resolve against it. Returns `None` when the body is not XML at
/// all — an AP whose description cannot be read is left to expire.
pub fn parse_device_description(body: &[u8], location: &str) -> Option<DeviceDescription> {
    let text = std::str::from_utf8(body).ok()?;
    let doc = Document::parse(text).ok()?;

    let resolve = |tag: &str| first_item(&doc, tag).map(|u| resolve_url(location, &u));

    Some(DeviceDescription {
        friendly_name: first_item(&doc, "friendlyName"),
        manufacturer: first_item(&doc, "manufacturer"),
        manufacturer_url: first_item(&doc, "manufacturerURL"),
        model_description: first_item(&doc, "modelDescription"),
        model_name: first_item(&doc, "modelName"),
        model_number: first_item(&doc, "modelNumber"),
        model_url: first_item(&doc, "modelURL"),
        serial_number: first_item(&doc, "serialNumber"),
        udn: first_item(&doc, "UDN"),
        upc: first_item(&doc, "UPC"),
        scpd_url: resolve("SCPDURL"),
        control_url: resolve("controlURL"),
        event_sub_url: resolve("eventSubURL"),
    })
}
