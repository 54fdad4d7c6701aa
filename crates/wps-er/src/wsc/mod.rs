// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wi-Fi Simple Config (WSC) TLV attribute codec.
//!
//! WSC messages are a flat stream of TLVs: 16-bit big-endian attribute
//! type, 16-bit big-endian length, value. This module decodes the subset
//! of attributes the registrar inspects (message type, enrollee identity
//! and device metadata) and builds the selected-registrar announcement
//! payload. The cryptographic message contents are opaque here; they are
//! consumed by the plugged-in WSC engine.

mod constants;

pub use constants::*;

/// Decoded view of the attributes the registrar cares about.
///
/// Unknown attributes are skipped; repeated attributes keep the first
/// occurrence. String-valued attributes are decoded lossily: WSC mandates
/// UTF-8 but enrollees are not uniformly well-behaved.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Attributes {
    pub msg_type: Option<u8>,
    pub config_methods: Option<u16>,
    pub uuid_e: Option<[u8; WPS_UUID_LEN]>,
    pub primary_dev_type: Option<[u8; WPS_DEV_TYPE_LEN]>,
    pub dev_password_id: Option<u16>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub serial_number: Option<String>,
    pub dev_name: Option<String>,
}

/// TLV stream decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Attribute header or value extends past the end of the buffer.
    Truncated,
    /// Fixed-size attribute carried the wrong length.
    BadLength(u16),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Truncated => write!(f, "truncated TLV stream"),
            ParseError::BadLength(attr) => write!(f, "bad length for attribute 0x{:04x}", attr),
        }
    }
}

fn be16(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}

fn text(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

/// Parse a WSC TLV stream into [`Attributes`].
///
/// The whole buffer must be a well-formed TLV sequence; a header or value
/// running past the end fails the parse (malformed enrollee messages are
/// dropped by the caller, not repaired).
pub fn parse_attributes(buf: &[u8]) -> Result<Attributes, ParseError> {
    let mut attrs = Attributes::default();
    let mut pos = 0usize;

    while pos < buf.len() {
        if buf.len() - pos < 4 {
            return Err(ParseError::Truncated);
        }
        let attr = be16(&buf[pos..]);
        let len = be16(&buf[pos + 2..]) as usize;
        pos += 4;
        if buf.len() - pos < len {
            return Err(ParseError::Truncated);
        }
        let value = &buf[pos..pos + len];
        pos += len;

        match attr {
            ATTR_MSG_TYPE => {
                if len != 1 {
                    return Err(ParseError::BadLength(attr));
                }
                attrs.msg_type.get_or_insert(value[0]);
            }
            ATTR_CONFIG_METHODS => {
                if len != 2 {
                    return Err(ParseError::BadLength(attr));
                }
                attrs.config_methods.get_or_insert(be16(value));
            }
            ATTR_UUID_E => {
                if len != WPS_UUID_LEN {
                    return Err(ParseError::BadLength(attr));
                }
                let mut uuid = [0u8; WPS_UUID_LEN];
                uuid.copy_from_slice(value);
                attrs.uuid_e.get_or_insert(uuid);
            }
            ATTR_PRIMARY_DEV_TYPE => {
                if len != WPS_DEV_TYPE_LEN {
                    return Err(ParseError::BadLength(attr));
                }
                let mut dev_type = [0u8; WPS_DEV_TYPE_LEN];
                dev_type.copy_from_slice(value);
                attrs.primary_dev_type.get_or_insert(dev_type);
            }
            ATTR_DEV_PASSWORD_ID => {
                if len != 2 {
                    return Err(ParseError::BadLength(attr));
                }
                attrs.dev_password_id.get_or_insert(be16(value));
            }
            ATTR_MANUFACTURER => {
                attrs.manufacturer.get_or_insert_with(|| text(value));
            }
            ATTR_MODEL_NAME => {
                attrs.model_name.get_or_insert_with(|| text(value));
            }
            ATTR_MODEL_NUMBER => {
                attrs.model_number.get_or_insert_with(|| text(value));
            }
            ATTR_SERIAL_NUMBER => {
                attrs.serial_number.get_or_insert_with(|| text(value));
            }
            ATTR_DEV_NAME => {
                attrs.dev_name.get_or_insert_with(|| text(value));
            }
            _ => {} // Not inspected by the registrar
        }
    }

    Ok(attrs)
}

fn put_attr(msg: &mut Vec<u8>, attr: u16, value: &[u8]) {
    msg.extend_from_slice(&attr.to_be_bytes());
    msg.extend_from_slice(&(value.len() as u16).to_be_bytes());
    msg.extend_from_slice(value);
}

/// Build the selected-registrar announcement payload: version plus the
/// three selected-registrar attributes, in that order.
pub fn build_selected_registrar(
    sel_reg: bool,
    dev_passwd_id: u16,
    sel_reg_config_methods: u16,
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(24);
    put_attr(&mut msg, ATTR_VERSION, &[WPS_VERSION]);
    put_attr(&mut msg, ATTR_SELECTED_REGISTRAR, &[u8::from(sel_reg)]);
    put_attr(&mut msg, ATTR_DEV_PASSWORD_ID, &dev_passwd_id.to_be_bytes());
    put_attr(
        &mut msg,
        ATTR_SELECTED_REGISTRAR_CONFIG_METHODS,
        &sel_reg_config_methods.to_be_bytes(),
    );
    msg
}
