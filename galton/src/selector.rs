//! Rule-based test selection
//!
//! The selector never looks at data. It takes the normality and
//! homogeneity verdicts plus the shape of the design and walks a fixed
//! precedence: hierarchy, then pairing, then group count.

use galton_core::GaltonError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Structure of the design, in decision precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Design {
    /// Repeated observations per subject or cluster
    Hierarchical,
    Paired,
    TwoGroups,
    ManyGroups,
    OneGroup,
}

impl Design {
    pub fn classify(has_subject_id: bool, is_paired: bool, group_count: usize) -> Self {
        match (has_subject_id, is_paired, group_count) {
            (true, _, _) => Design::Hierarchical,
            (false, true, _) => Design::Paired,
            (false, false, 2) => Design::TwoGroups,
            (false, false, k) if k > 2 => Design::ManyGroups,
            _ => Design::OneGroup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Lmm,
    GlmmOrLmm,
    PairedTTest,
    WilcoxonSignedRank,
    IndependentTTest,
    WelchTTest,
    MannWhitneyU,
    OneWayAnova,
    WelchAnova,
    KruskalWallis,
    OneSampleTTest,
    OneSampleWilcoxon,
}

impl Method {
    pub const ALL: [Method; 12] = [
        Method::Lmm,
        Method::GlmmOrLmm,
        Method::PairedTTest,
        Method::WilcoxonSignedRank,
        Method::IndependentTTest,
        Method::WelchTTest,
        Method::MannWhitneyU,
        Method::OneWayAnova,
        Method::WelchAnova,
        Method::KruskalWallis,
        Method::OneSampleTTest,
        Method::OneSampleWilcoxon,
    ];

    /// Canonical display name
    pub fn name(&self) -> &'static str {
        match self {
            Method::Lmm => "LMM",
            Method::GlmmOrLmm => "GLMM_or_LMM",
            Method::PairedTTest => "Paired T-test",
            Method::WilcoxonSignedRank => "Wilcoxon Signed-Rank",
            Method::IndependentTTest => "Independent T-test",
            Method::WelchTTest => "Welch's T-test",
            Method::MannWhitneyU => "Mann-Whitney U",
            Method::OneWayAnova => "One-way ANOVA",
            Method::WelchAnova => "Welch ANOVA",
            Method::KruskalWallis => "Kruskal-Wallis",
            Method::OneSampleTTest => "One-sample T-test",
            Method::OneSampleWilcoxon => "One-sample Wilcoxon",
        }
    }

    /// Parse a canonical name, ignoring case
    pub fn parse(s: &str) -> Result<Self, GaltonError> {
        let wanted = s.trim();
        Method::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let names: Vec<&str> = Method::ALL.iter().map(Method::name).collect();
                GaltonError::invalid_argument(format!("Unknown method '{}'", s))
                    .with_suggestion(format!("Use one of: {}", names.join(", ")))
            })
    }

    pub fn is_mixed_model(&self) -> bool {
        matches!(self, Method::Lmm | Method::GlmmOrLmm)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = GaltonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::parse(s)
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub method: Method,
    pub rationale: String,
}

impl Recommendation {
    fn new(method: Method, rationale: impl Into<String>) -> Self {
        Self {
            method,
            rationale: rationale.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TestSelector;

impl TestSelector {
    pub fn new() -> Self {
        Self
    }

    /// Pick a test family. `None` homogeneity is read as homogeneous.
    pub fn recommend(
        &self,
        is_normal: bool,
        is_homogeneous: Option<bool>,
        has_subject_id: bool,
        is_paired: bool,
        group_count: usize,
    ) -> Recommendation {
        let homogeneous = is_homogeneous.unwrap_or(true);
        let design = Design::classify(has_subject_id, is_paired, group_count);

        match (design, is_normal, homogeneous) {
            (Design::Hierarchical, true, _) => Recommendation::new(
                Method::Lmm,
                "Data has hierarchical structure (ID column detected). Recommend Linear Mixed Model (LMM).",
            ),
            (Design::Hierarchical, false, _) => Recommendation::new(
                Method::GlmmOrLmm,
                "Data has hierarchical structure (ID column detected). Data is non-normal. \
                 Recommend Generalized Linear Mixed Model (GLMM) or Transformation + LMM.",
            ),
            (Design::Paired, true, _) => Recommendation::new(Method::PairedTTest, "Data is Normal and Paired."),
            (Design::Paired, false, _) => {
                Recommendation::new(Method::WilcoxonSignedRank, "Data is Non-Normal and Paired.")
            }
            (Design::TwoGroups, true, true) => Recommendation::new(
                Method::IndependentTTest,
                "Normality and Homogeneity assumptions met.",
            ),
            (Design::TwoGroups, true, false) => {
                Recommendation::new(Method::WelchTTest, "Normality met, but Variance is unequal.")
            }
            (Design::TwoGroups, false, _) => {
                Recommendation::new(Method::MannWhitneyU, "Normality assumption violated.")
            }
            (Design::ManyGroups, true, true) => {
                Recommendation::new(Method::OneWayAnova, "Normality and Homogeneity met.")
            }
            (Design::ManyGroups, true, false) => {
                Recommendation::new(Method::WelchAnova, "Normality met, Variance unequal.")
            }
            (Design::ManyGroups, false, _) => Recommendation::new(Method::KruskalWallis, "Normality violated."),
            (Design::OneGroup, true, _) => {
                Recommendation::new(Method::OneSampleTTest, "Single group and Normality met.")
            }
            (Design::OneGroup, false, _) => {
                Recommendation::new(Method::OneSampleWilcoxon, "Single group and Normality violated.")
            }
        }
    }
}
