//! Negotiation context.

use serde::{Deserialize, Serialize};

/// How much access the negotiation may assume.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum NegotiationContext {
    /// Before authorization: only probes that need no elevated access
    Restricted,
    /// Every probe
    #[default]
    Full,
}
