//! Sacrament kinds and the lineage rules between them
//!
//! Baptism → First Holy Communion → Confirmation → (Marriage | Holy Order).
//! Each link is one-to-one; the two terminal kinds exclude each other.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SacramentKind {
    Baptism,
    FirstHolyCommunion,
    Confirmation,
    Marriage,
    HolyOrder,
}

/// Creation rule for one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineageRule {
    pub kind: SacramentKind,
    /// Kind that must exist before a record of this kind is created
    pub predecessor: Option<SacramentKind>,
    /// Kind that may not share a predecessor with this kind
    pub excludes: Option<SacramentKind>,
}

/// Indexed by `SacramentKind as usize`.
const RULES: [LineageRule; 5] = [
    LineageRule {
        kind: SacramentKind::Baptism,
        predecessor: None,
        excludes: None,
    },
    LineageRule {
        kind: SacramentKind::FirstHolyCommunion,
        predecessor: Some(SacramentKind::Baptism),
        excludes: None,
    },
    LineageRule {
        kind: SacramentKind::Confirmation,
        predecessor: Some(SacramentKind::FirstHolyCommunion),
        excludes: None,
    },
    LineageRule {
        kind: SacramentKind::Marriage,
        predecessor: Some(SacramentKind::Confirmation),
        excludes: Some(SacramentKind::HolyOrder),
    },
    LineageRule {
        kind: SacramentKind::HolyOrder,
        predecessor: Some(SacramentKind::Confirmation),
        excludes: Some(SacramentKind::Marriage),
    },
];

impl SacramentKind {
    pub const ALL: [SacramentKind; 5] = [
        SacramentKind::Baptism,
        SacramentKind::FirstHolyCommunion,
        SacramentKind::Confirmation,
        SacramentKind::Marriage,
        SacramentKind::HolyOrder,
    ];

    pub fn rule(self) -> &'static LineageRule {
        &RULES[self as usize]
    }

    /// Human-readable name used in error messages
    pub fn label(self) -> &'static str {
        match self {
            SacramentKind::Baptism => "Baptism",
            SacramentKind::FirstHolyCommunion => "First Holy Communion",
            SacramentKind::Confirmation => "Confirmation",
            SacramentKind::Marriage => "Marriage",
            SacramentKind::HolyOrder => "Holy Order",
        }
    }

    /// URL collection segment
    pub fn collection(self) -> &'static str {
        match self {
            SacramentKind::Baptism => "baptisms",
            SacramentKind::FirstHolyCommunion => "first-holy-communions",
            SacramentKind::Confirmation => "confirmations",
            SacramentKind::Marriage => "marriages",
            SacramentKind::HolyOrder => "holy-orders",
        }
    }
}

impl std::fmt::Display for SacramentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
