//! Reading and naming STRING / WIDECHAR entities.

use crate::backends::ImageReader;
use crate::db::batch::{Batch, BatchSummary};
use crate::db::store::{EntityStore, StoreResult};
use crate::model::{entity_name_from_string, EntityAttrs, Side};

/// Decode raw string bytes, dropping one trailing null terminator.
///
/// Narrow strings are latin-1 so every byte sequence decodes. Wide strings
/// are UTF-16LE; malformed data (odd length, unpaired surrogates) yields
/// `None`.
pub fn decode_string(bytes: &[u8], wide: bool) -> Option<String> {
    if wide {
        let body = bytes.strip_suffix(&[0, 0]).unwrap_or(bytes);
        if body.len() % 2 != 0 {
            return None;
        }
        encoding_rs::UTF_16LE
            .decode_without_bom_handling_and_without_replacement(body)
            .map(|text| text.into_owned())
    } else {
        let body = bytes.strip_suffix(&[0]).unwrap_or(bytes);
        Some(body.iter().map(|b| char::from(*b)).collect())
    }
}

impl EntityStore {
    /// Fetch raw bytes for every STRING/WIDECHAR entity with an address on
    /// `side`. Read failures are logged and skipped. Returns how many
    /// entities now have bytes.
    pub fn read_strings(&mut self, side: Side, reader: &dyn ImageReader) -> usize {
        let targets: Vec<(u64, Option<u64>, bool)> = self
            .get_all()
            .into_iter()
            .filter(|e| e.entity_type().is_some_and(|t| t.is_string()))
            .filter_map(|e| Some((e.addr(side)?, e.attrs.size, e.attrs.is_wide())))
            .collect();

        let mut read = 0;
        for (addr, size, wide) in targets {
            match reader.read(addr, size, wide) {
                Ok(bytes) => {
                    self.store_raw(side, addr, bytes);
                    read += 1;
                }
                Err(err) => {
                    tracing::debug!(
                        side = side.as_str(),
                        addr = format!("{addr:#x}"),
                        error = %err,
                        "Could not read string bytes"
                    );
                }
            }
        }
        read
    }

    /// Name each string entity after its decoded text, e.g. `"Hello"` or
    /// `L"Hello"`. Entities whose bytes are missing or do not decode keep
    /// their current name.
    pub fn name_strings(&mut self) -> StoreResult<BatchSummary> {
        let mut batch = Batch::new();
        for entity in self.get_all() {
            if !entity.entity_type().is_some_and(|t| t.is_string()) {
                continue;
            }
            let wide = entity.attrs.is_wide();
            let raw = [Side::Orig, Side::Recomp]
                .into_iter()
                .filter_map(|side| self.raw_bytes(side, entity.addr(side)?))
                .next();
            let Some(text) = raw.and_then(|bytes| decode_string(bytes, wide)) else {
                continue;
            };

            let attrs = EntityAttrs::new().with_name(entity_name_from_string(&text, wide));
            match (entity.orig_addr(), entity.recomp_addr()) {
                (Some(orig), _) => batch.set_orig(orig, attrs),
                (None, Some(recomp)) => batch.set_recomp(recomp, attrs),
                (None, None) => {}
            }
        }
        batch.apply(self)
    }
}
