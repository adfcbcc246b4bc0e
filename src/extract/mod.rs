//! Best-effort extractors over a parsed [`Document`](crate::model::Document).
//!
//! Each extractor is a pure function: same document, same output. They do not
//! retain references into the tree beyond integer coordinates, so their
//! artefacts can outlive the parse.

pub mod definitions;
pub mod references;
pub mod semantics;
pub mod terms;

use serde::{Deserialize, Serialize};

pub use definitions::extract as extract_definitions;
pub use references::extract as extract_references;
pub use semantics::extract as extract_semantics;
pub use terms::extract_usages;

/// A defined term recovered from a definitions article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinedTerm {
    /// Normalised key: lowercased, whitespace collapsed.
    pub term: String,
    /// The surface form exactly as written.
    pub surface: String,
    /// The definition body.
    pub definition: String,
    /// Article the definition lives in.
    pub article: u32,
}

/// External instrument kinds a citation can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalKind {
    Directive,
    Regulation,
    Decision,
    Treaty,
}

impl ExternalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directive => "directive",
            Self::Regulation => "regulation",
            Self::Decision => "decision",
            Self::Treaty => "treaty",
        }
    }
}

/// What a citation points at.
///
/// An article number of 0 in the `Paragraph` and `Point` variants marks a
/// relative citation ("paragraph 2", "point (a)") to be resolved against the
/// article it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefTarget {
    Article {
        number: u32,
        paragraph: Option<u32>,
        point: Option<String>,
        /// Inclusive end of an "Articles 13 to 15" range.
        range_end: Option<u32>,
    },
    Paragraph {
        article: u32,
        number: u32,
    },
    Point {
        article: u32,
        paragraph: u32,
        letter: String,
    },
    Chapter {
        key: String,
    },
    Section {
        number: u32,
    },
    Recital {
        number: u32,
    },
    External {
        kind: ExternalKind,
        year: u32,
        number: u32,
    },
}

impl RefTarget {
    /// Whether the target lives inside the citing document.
    pub fn is_internal(&self) -> bool {
        !matches!(self, Self::External { .. })
    }
}

/// A citation found in article text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub target: RefTarget,
    /// Article the citation was found in.
    pub source_article: u32,
    /// The raw matched span.
    pub raw: String,
}

/// The closed set of right categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RightKind {
    Access,
    Information,
    Rectification,
    Erasure,
    Restriction,
    Portability,
    Object,
    AutomatedDecision,
    WithdrawConsent,
    LodgeComplaint,
    EffectiveRemedy,
    Compensation,
}

impl RightKind {
    /// CamelCase tag used as the ontology IRI suffix (`reg:RightErasure`).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Access => "RightAccess",
            Self::Information => "RightInformation",
            Self::Rectification => "RightRectification",
            Self::Erasure => "RightErasure",
            Self::Restriction => "RightRestriction",
            Self::Portability => "RightPortability",
            Self::Object => "RightObject",
            Self::AutomatedDecision => "RightAutomatedDecision",
            Self::WithdrawConsent => "RightWithdrawConsent",
            Self::LodgeComplaint => "RightLodgeComplaint",
            Self::EffectiveRemedy => "RightEffectiveRemedy",
            Self::Compensation => "RightCompensation",
        }
    }
}

/// The closed set of obligation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObligationKind {
    Consent,
    LawfulProcessing,
    ProvideInformation,
    Transparency,
    Respond,
    NotifyBreach,
    NotifySubject,
    Secure,
    Record,
    Dpia,
    AppointDpo,
    TransferSafeguards,
}

impl ObligationKind {
    /// CamelCase tag used as the ontology IRI suffix (`reg:ObligationNotifyBreach`).
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Consent => "ObligationConsent",
            Self::LawfulProcessing => "ObligationLawfulProcessing",
            Self::ProvideInformation => "ObligationProvideInformation",
            Self::Transparency => "ObligationTransparency",
            Self::Respond => "ObligationRespond",
            Self::NotifyBreach => "ObligationNotifyBreach",
            Self::NotifySubject => "ObligationNotifySubject",
            Self::Secure => "ObligationSecure",
            Self::Record => "ObligationRecord",
            Self::Dpia => "ObligationDpia",
            Self::AppointDpo => "ObligationAppointDpo",
            Self::TransferSafeguards => "ObligationTransferSafeguards",
        }
    }
}

/// Parties a right or obligation attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EntityType {
    DataSubject,
    Consumer,
    Controller,
    Processor,
    Business,
    SupervisoryAuthority,
    Recipient,
    #[default]
    Unspecified,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataSubject => "data subject",
            Self::Consumer => "consumer",
            Self::Controller => "controller",
            Self::Processor => "processor",
            Self::Business => "business",
            Self::SupervisoryAuthority => "supervisory authority",
            Self::Recipient => "recipient",
            Self::Unspecified => "unspecified",
        }
    }
}

/// Whether an annotation grants a right or imposes an obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationKind {
    Right(RightKind),
    Obligation(ObligationKind),
}

/// A semantic annotation attached to an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticAnnotation {
    pub kind: AnnotationKind,
    pub article: u32,
    /// Beneficiary for rights, actor for obligations.
    pub party: EntityType,
    /// Rule confidence in [0, 1].
    pub confidence: f64,
    /// The text span that triggered the rule.
    pub span: String,
}

/// A defined term occurring in an article other than its defining one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermUsage {
    pub article: u32,
    /// Normalised term key.
    pub term: String,
}
