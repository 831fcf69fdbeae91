//! Order-preserving encoding of byte-string tuples.
//!
//! Each element is written with `0x00` escaped as `0x00 0xff` and terminated
//! by a bare `0x00`, so tuples sort element-wise in byte order and a packed
//! one-element prefix is a range prefix for all longer tuples starting with it.

use crate::error::{StateError, StateResult};

pub fn pack(elements: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(elements.iter().map(|e| e.len() + 1).sum());
    for element in elements {
        for &b in *element {
            out.push(b);
            if b == 0x00 {
                out.push(0xff);
            }
        }
        out.push(0x00);
    }
    out
}

pub fn unpack(bytes: &[u8]) -> StateResult<Vec<Vec<u8>>> {
    let mut elements = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match (bytes[i], bytes.get(i + 1)) {
            (0x00, Some(&0xff)) => {
                current.push(0x00);
                i += 2;
            }
            (0x00, _) => {
                elements.push(std::mem::take(&mut current));
                i += 1;
            }
            (b, _) => {
                current.push(b);
                i += 1;
            }
        }
    }
    if !current.is_empty() {
        return Err(StateError::Deserialize(format!(
            "unterminated tuple element {}",
            metagrid_core::printable(&current)
        )));
    }
    Ok(elements)
}
