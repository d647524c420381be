//! Domain types shared by the aligner, the rule engine and the store.

pub mod compound;
pub mod document;
pub mod record;

pub use compound::{new_compound_id, Compound, Provenance, COMPOUND_ID_PREFIX};
pub use document::{Document, DocumentStatus};
pub use record::{
    DeviceField, DeviceRecord, FieldError, FieldMap, MeasurementRecord, NumericFields,
    PhotophysicsField, PhotophysicsRecord, QualityFlag, RecordKind, StoredRecord,
};
