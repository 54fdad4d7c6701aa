// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `<WLANEvent>` extraction from GENA NOTIFY bodies.

use base64::{engine::general_purpose, Engine as _};
use roxmltree::Document;

/// Pull the first `<WLANEvent>` element out of an event notification body
/// and base64-decode it.
///
/// GENA wraps the value in a `<e:propertyset><e:property>` envelope; the
/// lookup is namespace-agnostic and position-independent. Embedded
/// whitespace in the base64 text (APs line-wrap it) is tolerated.
pub fn extract_wlanevent(body: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(body).ok()?;
    let doc = Document::parse(text).ok()?;

    let value = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "WLANEvent")
        .and_then(|n| n.text())?;

    let compact: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    general_purpose::STANDARD.decode(compact).ok()
}
