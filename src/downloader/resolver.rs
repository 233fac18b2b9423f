// QualityResolver - deterministic encoding selection
//
// Maps (catalog, requested tier, size budget) to a single encoding id.
// Handles:
// - Per-tier priority walk over fixed fallback heights (data table)
// - "Best" step: tallest muxed rendition with a known size under budget
// - Audio-only selection by bitrate
// - Relaxed fallback to the first candidate when nothing fits the budget

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::models::{EncodingDescriptor, QualityTier, SizeBudget};

/// One entry of a tier's priority list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PriorityStep {
    Height(u32),
    /// Tallest candidate that fits the budget
    Best,
}

impl fmt::Display for PriorityStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Height(h) => write!(f, "{}", h),
            Self::Best => write!(f, "best"),
        }
    }
}

impl FromStr for PriorityStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(Self::Best),
            other => other
                .trim_end_matches('p')
                .parse::<u32>()
                .ok()
                .filter(|h| QualityTier::from_height(*h).is_some())
                .map(Self::Height)
                .ok_or_else(|| format!("invalid priority step: {}", s)),
        }
    }
}

impl TryFrom<String> for PriorityStep {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PriorityStep> for String {
    fn from(step: PriorityStep) -> Self {
        step.to_string()
    }
}

use PriorityStep::{Best, Height};

const ORDER_144: [PriorityStep; 6] = [Height(144), Height(240), Height(360), Height(480), Height(720), Best];
const ORDER_240: [PriorityStep; 6] = [Height(240), Height(144), Height(360), Height(480), Height(720), Best];
const ORDER_360: [PriorityStep; 6] = [Height(360), Height(480), Height(240), Height(720), Height(144), Best];
const ORDER_480: [PriorityStep; 6] = [Height(480), Height(360), Height(720), Height(240), Best, Height(144)];
const ORDER_720: [PriorityStep; 6] = [Height(720), Height(480), Best, Height(360), Height(240), Height(144)];
const ORDER_BEST: [PriorityStep; 6] = [Best, Height(720), Height(480), Height(360), Height(240), Height(144)];

/// Lookup table from video tier to its ordered fallback steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityTable {
    orders: HashMap<QualityTier, Vec<PriorityStep>>,
}

impl Default for PriorityTable {
    fn default() -> Self {
        let orders = [
            (QualityTier::P144, ORDER_144.to_vec()),
            (QualityTier::P240, ORDER_240.to_vec()),
            (QualityTier::P360, ORDER_360.to_vec()),
            (QualityTier::P480, ORDER_480.to_vec()),
            (QualityTier::P720, ORDER_720.to_vec()),
            (QualityTier::Best, ORDER_BEST.to_vec()),
        ]
        .into_iter()
        .collect();

        Self { orders }
    }
}

impl PriorityTable {
    /// Replace individual tier orders. Every list must contain the `best` sentinel.
    pub fn with_overrides(
        mut self,
        overrides: &HashMap<QualityTier, Vec<PriorityStep>>,
    ) -> Result<Self, String> {
        for (tier, steps) in overrides {
            if tier.is_audio() {
                return Err("audio tier has no priority list".to_string());
            }
            if !steps.contains(&PriorityStep::Best) {
                return Err(format!("priority list for {} must contain 'best'", tier));
            }
            self.orders.insert(*tier, steps.clone());
        }
        Ok(self)
    }

    pub fn order(&self, tier: QualityTier) -> &[PriorityStep] {
        self.orders.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Which rule produced a choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionPath {
    ExactHeight(u32),
    BestUnderBudget,
    AudioUnderBudget,
    /// Nothing fit; first muxed candidate taken without the budget
    RelaxedFirstVideo,
    /// Nothing fit; first audio candidate taken without the budget
    RelaxedFirstAudio,
}

impl ResolutionPath {
    pub fn is_relaxed(&self) -> bool {
        matches!(self, Self::RelaxedFirstVideo | Self::RelaxedFirstAudio)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::ExactHeight(h) => format!("{}p under budget", h),
            Self::BestUnderBudget => "tallest under budget".to_string(),
            Self::AudioUnderBudget => "highest bitrate under budget".to_string(),
            Self::RelaxedFirstVideo => "first video, budget ignored".to_string(),
            Self::RelaxedFirstAudio => "first audio, budget ignored".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Chosen { id: String, path: ResolutionPath },
    NoSuitableEncoding,
}

impl ResolutionOutcome {
    fn chosen(encoding: &EncodingDescriptor, path: ResolutionPath) -> Self {
        Self::Chosen {
            id: encoding.id.clone(),
            path,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Chosen { id, .. } => Some(id),
            Self::NoSuitableEncoding => None,
        }
    }
}

/// Pure selection over a catalog
#[derive(Debug, Clone, Default)]
pub struct QualityResolver {
    table: PriorityTable,
}

impl QualityResolver {
    pub fn new(table: PriorityTable) -> Self {
        Self { table }
    }

    pub fn resolve(
        &self,
        catalog: &[EncodingDescriptor],
        tier: QualityTier,
        budget: SizeBudget,
    ) -> ResolutionOutcome {
        if tier.is_audio() {
            let audio: Vec<&EncodingDescriptor> =
                catalog.iter().filter(|e| e.is_audio_candidate()).collect();
            return Self::resolve_audio(&audio, budget);
        }

        let video: Vec<&EncodingDescriptor> =
            catalog.iter().filter(|e| e.is_video_candidate()).collect();

        for step in self.table.order(tier) {
            let found = match step {
                PriorityStep::Height(h) => video
                    .iter()
                    .find(|e| e.height_px == Some(*h) && e.fits(budget))
                    .map(|e| ResolutionOutcome::chosen(e, ResolutionPath::ExactHeight(*h))),
                PriorityStep::Best => Self::find_tallest_under_budget(&video, budget)
                    .map(|e| ResolutionOutcome::chosen(e, ResolutionPath::BestUnderBudget)),
            };

            if let Some(outcome) = found {
                return outcome;
            }
        }

        video
            .first()
            .map(|e| ResolutionOutcome::chosen(e, ResolutionPath::RelaxedFirstVideo))
            .unwrap_or(ResolutionOutcome::NoSuitableEncoding)
    }

    /// Resolve every tier, for explaining choices before a download
    pub fn explain(
        &self,
        catalog: &[EncodingDescriptor],
        budget: SizeBudget,
    ) -> Vec<(QualityTier, ResolutionOutcome)> {
        QualityTier::ALL
            .iter()
            .map(|tier| (*tier, self.resolve(catalog, *tier, budget)))
            .collect()
    }

    fn resolve_audio(audio: &[&EncodingDescriptor], budget: SizeBudget) -> ResolutionOutcome {
        let mut best: Option<&EncodingDescriptor> = None;
        for candidate in audio.iter().copied().filter(|e| e.known_fit(budget)) {
            let bitrate = candidate.bitrate_kbps.unwrap_or(0.0);
            if best.map_or(true, |b| bitrate > b.bitrate_kbps.unwrap_or(0.0)) {
                best = Some(candidate);
            }
        }

        if let Some(b) = best {
            return ResolutionOutcome::chosen(b, ResolutionPath::AudioUnderBudget);
        }

        audio
            .first()
            .map(|e| ResolutionOutcome::chosen(e, ResolutionPath::RelaxedFirstAudio))
            .unwrap_or(ResolutionOutcome::NoSuitableEncoding)
    }

    /// Ties keep the first-seen candidate
    fn find_tallest_under_budget<'a>(
        video: &[&'a EncodingDescriptor],
        budget: SizeBudget,
    ) -> Option<&'a EncodingDescriptor> {
        let mut best: Option<&'a EncodingDescriptor> = None;
        for candidate in video.iter().copied().filter(|e| e.known_fit(budget)) {
            let height = candidate.height_px.unwrap_or(0);
            if best.map_or(true, |b| height > b.height_px.unwrap_or(0)) {
                best = Some(candidate);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn make_video(id: &str, height: u32, size: Option<u64>) -> EncodingDescriptor {
        EncodingDescriptor {
            id: id.to_string(),
            ext: Some("mp4".to_string()),
            has_video: true,
            has_audio: true,
            height_px: Some(height),
            bitrate_kbps: None,
            size_bytes: size,
        }
    }

    fn make_audio(id: &str, bitrate: f64, size: Option<u64>) -> EncodingDescriptor {
        EncodingDescriptor {
            id: id.to_string(),
            ext: Some("m4a".to_string()),
            has_video: false,
            has_audio: true,
            height_px: None,
            bitrate_kbps: Some(bitrate),
            size_bytes: size,
        }
    }

    fn budget_mb(mb: u64) -> SizeBudget {
        SizeBudget::from_megabytes(mb).unwrap()
    }

    #[test]
    fn test_exact_height_under_budget() {
        let catalog = vec![
            make_video("18", 360, Some(10 * MB)),
            make_video("22", 720, Some(80 * MB)),
        ];
        let outcome = QualityResolver::default().resolve(&catalog, QualityTier::P360, budget_mb(50));
        assert_eq!(
            outcome,
            ResolutionOutcome::Chosen {
                id: "18".to_string(),
                path: ResolutionPath::ExactHeight(360)
            }
        );
    }

    #[test]
    fn test_over_budget_falls_through_to_first_candidate() {
        let catalog = vec![make_video("22", 720, Some(80 * MB))];
        let outcome = QualityResolver::default().resolve(&catalog, QualityTier::P360, budget_mb(50));
        assert_eq!(
            outcome,
            ResolutionOutcome::Chosen {
                id: "22".to_string(),
                path: ResolutionPath::RelaxedFirstVideo
            }
        );
    }

    #[test]
    fn test_audio_relaxes_budget() {
        let catalog = vec![make_audio("140", 128.0, Some(60 * MB))];
        let outcome = QualityResolver::default().resolve(&catalog, QualityTier::Audio, budget_mb(50));
        assert_eq!(
            outcome,
            ResolutionOutcome::Chosen {
                id: "140".to_string(),
                path: ResolutionPath::RelaxedFirstAudio
            }
        );
    }

    #[test]
    fn test_audio_picks_highest_bitrate_that_fits() {
        let catalog = vec![
            make_audio("139", 48.0, Some(MB)),
            make_audio("251", 160.0, Some(70 * MB)),
            make_audio("140", 128.0, Some(4 * MB)),
            make_audio("250", 128.0, Some(3 * MB)),
        ];
        let outcome = QualityResolver::default().resolve(&catalog, QualityTier::Audio, budget_mb(50));
        assert_eq!(outcome.id(), Some("140"));
    }

    #[test]
    fn test_audio_requires_known_size_to_count_as_fitting() {
        let catalog = vec![
            make_audio("251", 160.0, None),
            make_audio("139", 48.0, Some(MB)),
        ];
        let outcome = QualityResolver::default().resolve(&catalog, QualityTier::Audio, budget_mb(50));
        assert_eq!(outcome.id(), Some("139"));
    }

    #[test]
    fn test_audio_never_selects_video() {
        let catalog = vec![make_video("18", 360, Some(MB))];
        assert_eq!(
            QualityResolver::default().resolve(&catalog, QualityTier::Audio, budget_mb(50)),
            ResolutionOutcome::NoSuitableEncoding
        );
    }

    #[test]
    fn test_video_only_and_silent_formats_are_ignored() {
        let mut video_only = make_video("137", 360, Some(MB));
        video_only.has_audio = false;
        let mut neither = make_video("sb0", 360, Some(MB));
        neither.has_audio = false;
        neither.has_video = false;

        let catalog = vec![video_only, neither, make_audio("140", 128.0, Some(MB))];
        assert_eq!(
            QualityResolver::default().resolve(&catalog, QualityTier::P360, budget_mb(50)),
            ResolutionOutcome::NoSuitableEncoding
        );
    }

    #[test]
    fn test_priority_walk_order_for_360() {
        let catalog = vec![
            make_video("a", 720, Some(MB)),
            make_video("b", 240, Some(MB)),
            make_video("c", 480, Some(MB)),
        ];
        let outcome = QualityResolver::default().resolve(&catalog, QualityTier::P360, budget_mb(50));
        assert_eq!(outcome.id(), Some("c"));
    }

    #[test]
    fn test_480_tries_best_before_144() {
        let catalog = vec![
            make_video("tiny", 144, Some(MB)),
            make_video("odd", 1080, Some(2 * MB)),
        ];
        let outcome = QualityResolver::default().resolve(&catalog, QualityTier::P480, budget_mb(50));
        assert_eq!(
            outcome,
            ResolutionOutcome::Chosen {
                id: "odd".to_string(),
                path: ResolutionPath::BestUnderBudget
            }
        );
    }

    #[test]
    fn test_best_tie_keeps_first_seen() {
        let catalog = vec![
            make_video("first", 720, Some(MB)),
            make_video("second", 720, Some(MB)),
            make_video("big", 1080, Some(90 * MB)),
        ];
        let outcome = QualityResolver::default().resolve(&catalog, QualityTier::Best, budget_mb(50));
        assert_eq!(outcome.id(), Some("first"));
    }

    #[test]
    fn test_unknown_size_passes_height_steps_but_not_best() {
        let catalog = vec![make_video("nosize", 1080, None), make_video("sized", 240, Some(MB))];
        let resolver = QualityResolver::default();

        // Best step skips the 1080 rendition with no size estimate
        assert_eq!(
            resolver.resolve(&catalog, QualityTier::Best, budget_mb(50)).id(),
            Some("sized")
        );

        let catalog = vec![make_video("nosize", 360, None)];
        assert_eq!(
            resolver.resolve(&catalog, QualityTier::P360, budget_mb(50)),
            ResolutionOutcome::Chosen {
                id: "nosize".to_string(),
                path: ResolutionPath::ExactHeight(360)
            }
        );
    }

    #[test]
    fn test_exact_height_is_never_substituted() {
        let resolver = QualityResolver::default();
        for tier in QualityTier::ALL.iter().filter(|t| t.height().is_some()) {
            let height = tier.height().unwrap();
            let catalog: Vec<EncodingDescriptor> = [144, 240, 360, 480, 720, 1080]
                .iter()
                .map(|h| make_video(&format!("f{}", h), *h, Some(MB)))
                .collect();
            assert_eq!(
                resolver.resolve(&catalog, *tier, budget_mb(50)).id(),
                Some(format!("f{}", height).as_str())
            );
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let catalog = vec![
            make_video("a", 360, Some(60 * MB)),
            make_video("b", 480, None),
            make_audio("c", 64.0, Some(MB)),
            make_audio("d", 64.0, Some(MB)),
        ];
        let resolver = QualityResolver::default();
        for tier in QualityTier::ALL {
            for budget in [budget_mb(1), budget_mb(50)] {
                assert_eq!(
                    resolver.resolve(&catalog, tier, budget),
                    resolver.resolve(&catalog, tier, budget)
                );
            }
        }
    }

    #[test]
    fn test_empty_catalog() {
        let resolver = QualityResolver::default();
        for tier in QualityTier::ALL {
            assert_eq!(
                resolver.resolve(&[], tier, budget_mb(50)),
                ResolutionOutcome::NoSuitableEncoding
            );
        }
    }

    #[test]
    fn test_override_replaces_order() {
        let overrides: HashMap<QualityTier, Vec<PriorityStep>> =
            serde_json::from_str(r#"{"360": ["240", "best"]}"#).unwrap();
        let table = PriorityTable::default().with_overrides(&overrides).unwrap();
        assert_eq!(
            table.order(QualityTier::P360),
            &[PriorityStep::Height(240), PriorityStep::Best]
        );

        let catalog = vec![make_video("a", 480, Some(MB)), make_video("b", 240, Some(MB))];
        let outcome = QualityResolver::new(table).resolve(&catalog, QualityTier::P360, budget_mb(50));
        assert_eq!(outcome.id(), Some("b"));
    }

    #[test]
    fn test_override_without_best_is_rejected() {
        let overrides = HashMap::from([(QualityTier::P360, vec![PriorityStep::Height(360)])]);
        assert!(PriorityTable::default().with_overrides(&overrides).is_err());

        let audio = HashMap::from([(QualityTier::Audio, vec![PriorityStep::Best])]);
        assert!(PriorityTable::default().with_overrides(&audio).is_err());
    }

    #[test]
    fn test_step_parsing() {
        assert_eq!("480p".parse::<PriorityStep>(), Ok(PriorityStep::Height(480)));
        assert_eq!("BEST".parse::<PriorityStep>(), Ok(PriorityStep::Best));
        assert!("1080".parse::<PriorityStep>().is_err());
    }
}
