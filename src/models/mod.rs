//! Core data models for citations, lookups and audits.

mod audit;
mod citation;
mod lookup;

pub use audit::{
    AuditReport, CitationAudit, CitationContext, CitationStatus, JustificationCheck,
    ReferenceEntry, RelevanceScore,
};
pub use citation::{CitationRecord, CitationRecordBuilder, IdentifierKind};
pub use lookup::{LookupResult, LookupTier, ServiceTag};
