//! Shared names and key helpers used across Metagrid crates.

use thiserror::Error;

/// Name of a tenant (unique within a metacluster).
pub type TenantName = String;

/// Name of a tenant group.
pub type TenantGroupName = String;

/// Name of a registered data cluster.
pub type ClusterName = String;

/// Longest name accepted for tenants, tenant groups, and clusters.
pub const MAX_NAME_BYTES: usize = 255;

/// What a name identifies, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Tenant,
    TenantGroup,
    Cluster,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NameKind::Tenant => "tenant",
            NameKind::TenantGroup => "tenant group",
            NameKind::Cluster => "cluster",
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("{0} name must not be empty")]
    Empty(NameKind),

    #[error("{kind} name `{name}' exceeds {MAX_NAME_BYTES} bytes")]
    TooLong { kind: NameKind, name: String },

    #[error("{kind} name `{name}' contains control characters")]
    ControlCharacter { kind: NameKind, name: String },
}

/// Check that `name` is usable as a tenant, group, or cluster name.
pub fn validate_name(kind: NameKind, name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty(kind));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(NameError::TooLong {
            kind,
            name: name.to_string(),
        });
    }
    if name.chars().any(char::is_control) {
        return Err(NameError::ControlCharacter {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Render bytes as ASCII, escaping everything else as `\xNN`.
pub fn printable(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            32..=126 => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid escape sequence at offset {offset} in `{input}'")]
pub struct EscapeError {
    pub input: String,
    pub offset: usize,
}

/// Inverse of [`printable`]: decode `\xNN` and `\\` escapes into raw bytes.
pub fn unprintable(input: &str) -> Result<Vec<u8>, EscapeError> {
    let raw = input.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'\\' {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        let err = || EscapeError {
            input: input.to_string(),
            offset: i,
        };
        match raw.get(i + 1) {
            Some(b'\\') => {
                out.push(b'\\');
                i += 2;
            }
            Some(b'x') => {
                let hex = raw.get(i + 2..i + 4).ok_or_else(err)?;
                let hex = std::str::from_utf8(hex).map_err(|_| err())?;
                out.push(u8::from_str_radix(hex, 16).map_err(|_| err())?);
                i += 4;
            }
            _ => return Err(err()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_escapes_non_ascii() {
        assert_eq!(printable(b"\xff/tenant/"), "\\xff/tenant/");
        assert_eq!(printable(&[0, 0, 0, 7]), "\\x00\\x00\\x00\\x07");
        assert_eq!(printable(b"a\\b"), "a\\\\b");
    }

    #[test]
    fn unprintable_reverses_printable() {
        let raw = b"\xff/metacluster/\x00\\x";
        assert_eq!(unprintable(&printable(raw)).unwrap(), raw.to_vec());
    }

    #[test]
    fn unprintable_rejects_truncated_escape() {
        let err = unprintable("abc\\x1").unwrap_err();
        assert_eq!(err.offset, 3);
        assert!(unprintable("\\q").is_err());
    }

    #[test]
    fn name_validation() {
        assert!(validate_name(NameKind::Cluster, "clusterA").is_ok());
        assert_eq!(
            validate_name(NameKind::Tenant, ""),
            Err(NameError::Empty(NameKind::Tenant))
        );
        assert!(validate_name(NameKind::TenantGroup, "bad\nname").is_err());
        assert!(validate_name(NameKind::Cluster, &"x".repeat(MAX_NAME_BYTES + 1)).is_err());
    }
}
