//! Linkage criteria and their Lance-Williams update rules.

use crate::error::{CartographerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rule defining the dissimilarity between two clusters.
///
/// Numeric codes 1 to 8 follow the conventional ordering used on the
/// command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Linkage {
    /// 1: minimum increase of within-cluster inertia.
    Ward,
    /// 2: nearest members.
    Single,
    /// 3: farthest members.
    Complete,
    /// 4: size-weighted mean of member dissimilarities.
    Average,
    /// 5: unweighted mean of the two merged dissimilarities.
    McQuitty,
    /// 6: midpoint (Gower).
    Median,
    /// 7: distance between centroids.
    Centroid,
    /// 8: Ward on dissimilarities normalised by the objects' variances.
    ScaledWard,
}

impl Linkage {
    /// All criteria in code order.
    pub const ALL: [Linkage; 8] = [
        Linkage::Ward,
        Linkage::Single,
        Linkage::Complete,
        Linkage::Average,
        Linkage::McQuitty,
        Linkage::Median,
        Linkage::Centroid,
        Linkage::ScaledWard,
    ];

    /// Numeric code (1 to 8).
    pub fn code(self) -> u8 {
        match self {
            Linkage::Ward => 1,
            Linkage::Single => 2,
            Linkage::Complete => 3,
            Linkage::Average => 4,
            Linkage::McQuitty => 5,
            Linkage::Median => 6,
            Linkage::Centroid => 7,
            Linkage::ScaledWard => 8,
        }
    }

    /// Parses a numeric code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1..=8 => Ok(Self::ALL[code as usize - 1]),
            other => Err(CartographerError::UnknownCriterion(other)),
        }
    }

    /// True when initial dissimilarities need per-object variances.
    pub fn needs_sigma(self) -> bool {
        self == Linkage::ScaledWard
    }

    /// Initial dissimilarity of two objects from their squared Euclidean
    /// distance `sq`, member counts and variances.
    pub fn initial(self, sq: f64, m_i: f64, m_j: f64, sigma_i: f64, sigma_j: f64) -> f64 {
        match self {
            Linkage::Ward => sq * m_i * m_j / (m_i + m_j),
            Linkage::ScaledWard => {
                let total = m_i + m_j;
                sq * m_i * m_j / total / (sigma_i * sigma_j * total)
            }
            _ => sq,
        }
    }

    /// Lance-Williams recurrence: dissimilarity between `i ∪ j` and `k`.
    ///
    /// `d_ik`, `d_jk`, `d_ij` are current dissimilarities; `m_*` are member
    /// counts before the merge.
    pub fn update(self, d_ik: f64, d_jk: f64, d_ij: f64, m_i: f64, m_j: f64, m_k: f64) -> f64 {
        match self {
            Linkage::Ward | Linkage::ScaledWard => {
                ((m_i + m_k) * d_ik + (m_j + m_k) * d_jk - m_k * d_ij) / (m_i + m_j + m_k)
            }
            Linkage::Single => d_ik.min(d_jk),
            Linkage::Complete => d_ik.max(d_jk),
            Linkage::Average => (m_i * d_ik + m_j * d_jk) / (m_i + m_j),
            Linkage::McQuitty => 0.5 * d_ik + 0.5 * d_jk,
            Linkage::Median => 0.5 * d_ik + 0.5 * d_jk - 0.25 * d_ij,
            Linkage::Centroid => {
                let m = m_i + m_j;
                (m_i * d_ik + m_j * d_jk - m_i * m_j * d_ij / m) / m
            }
        }
    }

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Linkage::Ward => "ward",
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::McQuitty => "mcquitty",
            Linkage::Median => "median",
            Linkage::Centroid => "centroid",
            Linkage::ScaledWard => "scaled-ward",
        }
    }
}

impl TryFrom<u8> for Linkage {
    type Error = CartographerError;

    fn try_from(code: u8) -> Result<Self> {
        Linkage::from_code(code)
    }
}

impl FromStr for Linkage {
    type Err = CartographerError;

    /// Accepts either the numeric code or the name.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(code) = s.parse::<u8>() {
            return Linkage::from_code(code);
        }
        Linkage::ALL
            .into_iter()
            .find(|l| l.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CartographerError::Config(format!("unknown linkage criterion '{s}'")))
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
