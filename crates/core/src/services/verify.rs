//! Checks that flag problems with entities after matching.

use serde::{Deserialize, Serialize};

use crate::backends::ImageReader;
use crate::db::{decode_string, EntityStore};
use crate::events::{EventKind, Reporter};
use crate::model::{entity_name_from_string, EntityType};

/// Why a matched vtable looks bigger in the recompiled binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum VtableWarningReason {
    /// The next annotated orig address leaves less room than the recomp size.
    ExceedsNextAnnotation { limit: u64, recomp_size: u64 },
    /// The orig table contains a null slot (padding before the next table).
    NullSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VtableWarning {
    pub name: String,
    pub orig_addr: u64,
    #[serde(flatten)]
    pub reason: VtableWarningReason,
}

/// Flag matched vtables whose recomp version has more slots than the orig.
///
/// The next annotated orig address bounds the orig table's size; a zero
/// 4-byte slot inside the orig table is padding between two tables. The
/// last vtable in the orig address space is not checked.
pub fn check_vtables(store: &EntityStore, orig: &dyn ImageReader) -> Vec<VtableWarning> {
    let mut warnings = Vec::new();

    for entity in store.get_matches_by_type(EntityType::Vtable) {
        let (Some(orig_addr), Some(size)) = (entity.orig_addr(), entity.attrs.size) else {
            continue;
        };
        let name = entity.name().unwrap_or("<unnamed>").to_owned();
        let Some(next_orig) = store.get_next_orig_addr(orig_addr) else {
            continue;
        };

        let limit = next_orig - orig_addr;
        if limit < size {
            tracing::warn!("Recomp vtable is larger than orig vtable for {name}");
            warnings.push(VtableWarning {
                name,
                orig_addr,
                reason: VtableWarningReason::ExceedsNextAnnotation { limit, recomp_size: size },
            });
            continue;
        }

        let table_size = 4 * (size.min(limit) / 4);
        let table = match orig.read(orig_addr, Some(table_size), false) {
            Ok(table) => table,
            Err(err) => {
                tracing::debug!(vtable = %name, error = %err, "Could not read orig vtable");
                continue;
            }
        };
        let has_null_slot = table
            .chunks_exact(4)
            .any(|slot| u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]) == 0);
        if has_null_slot {
            tracing::warn!("Recomp vtable is larger than orig vtable for {name}");
            warnings.push(VtableWarning { name, orig_addr, reason: VtableWarningReason::NullSlot });
        }
    }

    warnings
}

/// A string literal annotated in the decompiled source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringAnnotation {
    pub address: u64,
    pub text: String,
    #[serde(default)]
    pub wide: bool,
}

/// Make sure every string annotation describes the bytes actually at its
/// orig address. Each disagreement is reported as `INVALID_USER_DATA`.
/// Returns the number of disagreeing annotations.
pub fn check_code_strings(
    store: &EntityStore,
    orig: &dyn ImageReader,
    annotations: &[StringAnnotation],
    reporter: &mut dyn Reporter,
) -> usize {
    let mut mismatches = 0;

    for annotation in annotations {
        let addr = annotation.address;
        let expected_name = entity_name_from_string(&annotation.text, annotation.wide);
        let entity = store.get_by_orig(addr, true);

        let size = entity.and_then(|e| e.attrs.size);
        let decoded = orig
            .read(addr, size, annotation.wide)
            .ok()
            .and_then(|bytes| decode_string(&bytes, annotation.wide));
        let bytes_agree = decoded.as_deref() == Some(annotation.text.as_str());

        let name_agrees = entity
            .filter(|e| e.entity_type().is_some_and(|t| t.is_string()))
            .and_then(|e| e.name())
            .map_or(true, |name| name == expected_name);

        if !(bytes_agree && name_agrees) {
            mismatches += 1;
            reporter.report(
                EventKind::InvalidUserData,
                addr,
                &format!("Data at 0x{addr:x} does not match string {:?}", annotation.text),
            );
        }
    }

    mismatches
}
