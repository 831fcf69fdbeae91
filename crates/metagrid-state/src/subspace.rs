//! Key prefixes that partition the keyspace into independently scannable
//! collections.

use crate::error::StateResult;
use crate::tuple;

/// A key prefix. Every key of a collection starts with its subspace prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Nested subspace `self.prefix ++ suffix`.
    pub fn child(&self, suffix: &[u8]) -> Subspace {
        Subspace::new(self.pack(suffix))
    }

    pub fn key(&self) -> &[u8] {
        &self.prefix
    }

    /// `self.prefix ++ suffix`.
    pub fn pack(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + suffix.len());
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(suffix);
        key
    }

    /// `self.prefix ++ tuple::pack(elements)`.
    pub fn pack_tuple(&self, elements: &[&[u8]]) -> Vec<u8> {
        self.pack(&tuple::pack(elements))
    }

    /// Strip the prefix, or `None` if `key` is outside this subspace.
    pub fn unpack<'k>(&self, key: &'k [u8]) -> Option<&'k [u8]> {
        key.strip_prefix(self.prefix.as_slice())
    }

    pub fn unpack_tuple(&self, key: &[u8]) -> StateResult<Vec<Vec<u8>>> {
        let suffix = self.unpack(key).ok_or_else(|| {
            crate::StateError::Deserialize(format!(
                "key {} is outside subspace {}",
                metagrid_core::printable(key),
                metagrid_core::printable(&self.prefix)
            ))
        })?;
        tuple::unpack(suffix)
    }

    /// `[prefix, strinc(prefix))`: every key in this subspace.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        (self.prefix.clone(), strinc(&self.prefix))
    }

    /// Keys in this subspace whose suffix falls in `[begin, end)`.
    pub fn range_between(&self, begin: &[u8], end: Option<&[u8]>) -> (Vec<u8>, Vec<u8>) {
        let end = match end {
            Some(end) => self.pack(end),
            None => strinc(&self.prefix),
        };
        (self.pack(begin), end)
    }
}

/// The first key that does not have `key` as a prefix.
pub fn strinc(key: &[u8]) -> Vec<u8> {
    let trimmed_len = key.len() - key.iter().rev().take_while(|&&b| b == 0xff).count();
    if trimmed_len == 0 {
        // All 0xff: nothing sorts after it except longer 0xff runs.
        let mut out = key.to_vec();
        out.push(0xff);
        return out;
    }
    let mut out = key[..trimmed_len].to_vec();
    if let Some(last) = out.last_mut() {
        *last += 1;
    }
    out
}

/// The immediate successor of `key` in byte order.
pub fn key_after(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.extend_from_slice(key);
    out.push(0x00);
    out
}
