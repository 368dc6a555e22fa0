//! Opt-in post-processing of scored drugs, applied before ranking.
//!
//! Order: cohort lift → treatment-line modulation → calibration snapshot →
//! SAE features. A failing step omits its own feature and nothing else.
//! Every collaborator call shares the request deadline; a step still pending
//! when it passes is omitted like any other failure.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use efficacy_common::config::ConfidenceConfig;
use efficacy_common::entities::{AdjustmentKind, SaeFeatureSet};
use efficacy_common::{DrugConfig, DrugScoreResult, EfficacyError, EfficacyRequest, Provenance, Result, Variant};

use crate::collaborators::{CalibrationSource, CohortProvider, Collaborators, SaeExtractor};

pub const COHORT_FEATURE: &str = "cohort_overlay";
pub const TREATMENT_LINE_FEATURE: &str = "treatment_line";
pub const CALIBRATION_FEATURE: &str = "calibration_snapshot";
pub const SAE_FEATURE: &str = "sae_features";

/// Extra response sections produced by post-processing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostProcessOutput {
    pub cohort_signals: BTreeMap<String, f64>,
    pub sae_features: Option<Vec<SaeFeatureSet>>,
}

pub struct PostProcessor {
    cohort: Option<Arc<dyn CohortProvider>>,
    calibration: Option<Arc<dyn CalibrationSource>>,
    sae: Option<Arc<dyn SaeExtractor>>,
    config: ConfidenceConfig,
}

impl PostProcessor {
    pub fn new(collaborators: &Collaborators, config: ConfidenceConfig) -> Self {
        Self {
            cohort: collaborators.cohort.clone(),
            calibration: collaborators.calibration.clone(),
            sae: collaborators.sae.clone(),
            config,
        }
    }

    /// `drugs[i]` must be the result for `panel[i]`.
    pub async fn run(
        &self,
        req: &EfficacyRequest,
        variants: &[Variant],
        panel: &[DrugConfig],
        drugs: &mut [DrugScoreResult],
        provenance: &mut Provenance,
        deadline: Instant,
    ) -> PostProcessOutput {
        let opts = &req.options;
        let started = Instant::now();
        let mut out = PostProcessOutput::default();

        if opts.include_cohort_overlay {
            let step = self.cohort_lift(variants, &req.disease, drugs);
            match within(deadline, started, COHORT_FEATURE, step).await {
                Ok(signals) => {
                    provenance.flag(COHORT_FEATURE, true);
                    out.cohort_signals = signals;
                }
                Err(e) => {
                    warn!(error = %e, "Cohort overlay failed; omitting");
                    provenance.omit_feature(COHORT_FEATURE);
                }
            }
        }

        if !opts.treatment_history.is_empty() {
            let penalised = apply_treatment_line(&opts.treatment_history, panel, drugs, &self.config);
            debug!(penalised, "Treatment-line modulation applied");
            provenance.flag(TREATMENT_LINE_FEATURE, true);
        }

        if opts.include_calibration_snapshot {
            match within(deadline, started, CALIBRATION_FEATURE, self.calibrate(drugs)).await {
                Ok(()) => provenance.flag(CALIBRATION_FEATURE, true),
                Err(e) => {
                    warn!(error = %e, "Calibration snapshot failed; omitting");
                    provenance.omit_feature(CALIBRATION_FEATURE);
                }
            }
        }

        if opts.include_sae_features {
            let step = self.sae_features(variants, &req.model_id);
            match within(deadline, started, SAE_FEATURE, step).await {
                Ok(sets) => {
                    provenance.flag(SAE_FEATURE, true);
                    out.sae_features = Some(sets);
                }
                Err(e) => {
                    warn!(error = %e, "SAE extraction failed; omitting");
                    provenance.omit_feature(SAE_FEATURE);
                }
            }
        }

        out
    }

    /// Lift every drug by `min(cap, 0.1 × max coverage)`.
    async fn cohort_lift(
        &self,
        variants: &[Variant],
        disease: &str,
        drugs: &mut [DrugScoreResult],
    ) -> Result<BTreeMap<String, f64>> {
        let provider = self.cohort.as_deref().ok_or_else(|| unconfigured("cohort"))?;
        let genes: BTreeSet<String> = variants.iter().map(Variant::gene_upper).collect();
        let lookups = genes.iter().map(|g| provider.coverage(g, disease));
        let mut signals = BTreeMap::new();
        for (gene, coverage) in genes.iter().zip(join_all(lookups).await) {
            signals.insert(gene.clone(), coverage?);
        }

        let max_coverage = signals.values().copied().fold(0.0_f64, f64::max);
        let lift = (0.1 * max_coverage).min(self.config.cohort_lift_cap);
        if lift > 0.0 {
            for drug in drugs.iter_mut() {
                drug.apply_adjustment(AdjustmentKind::CohortLift, lift);
            }
        }
        Ok(signals)
    }

    async fn calibrate(&self, drugs: &mut [DrugScoreResult]) -> Result<()> {
        let source = self.calibration.as_deref().ok_or_else(|| unconfigured("calibration"))?;
        let lookups = drugs.iter().map(|d| source.percentile(&d.name, d.confidence));
        let percentiles = join_all(lookups).await.into_iter().collect::<Result<Vec<f64>>>()?;
        for (drug, pct) in drugs.iter_mut().zip(percentiles) {
            drug.calibration_percentile = Some(pct);
        }
        Ok(())
    }

    async fn sae_features(&self, variants: &[Variant], model_id: &str) -> Result<Vec<SaeFeatureSet>> {
        let extractor = self.sae.as_deref().ok_or_else(|| unconfigured("sae"))?;
        let lookups = variants.iter().map(|v| extractor.features(v, model_id));
        let mut sets = Vec::with_capacity(variants.len());
        for (variant, features) in variants.iter().zip(join_all(lookups).await) {
            sets.push(SaeFeatureSet { variant: variant.key(), features: features? });
        }
        Ok(sets)
    }
}

/// Resolve `step`, or a timeout for `stage` once `deadline` passes.
async fn within<T>(deadline: Instant, started: Instant, stage: &str, step: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout_at(deadline, step).await {
        Ok(result) => result,
        Err(_) => Err(EfficacyError::Timeout {
            stage: stage.to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }),
    }
}

fn unconfigured(service: &str) -> EfficacyError {
    EfficacyError::upstream(service, "not configured")
}

/// Cross-resistance penalty for prior therapies in the same class (or the same
/// drug). Returns how many drugs were penalised.
pub fn apply_treatment_line(
    history: &[String],
    panel: &[DrugConfig],
    drugs: &mut [DrugScoreResult],
    config: &ConfidenceConfig,
) -> usize {
    let mut penalised = 0;
    for (drug, cfg) in drugs.iter_mut().zip(panel) {
        let matches = history
            .iter()
            .filter(|prior| cfg.class_is(prior.trim()) || cfg.name.eq_ignore_ascii_case(prior.trim()))
            .count();
        if matches == 0 {
            continue;
        }
        let penalty = (config.cross_resistance_penalty * matches as f64).min(config.cross_resistance_cap);
        drug.apply_adjustment(AdjustmentKind::CrossResistance, -penalty);
        penalised += 1;
    }
    penalised
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockCalibrationSource, MockCohortProvider, MockSaeExtractor};
    use efficacy_common::entities::SaeFeature;
    use efficacy_common::{EfficacyOptions, EvidenceTier, Rationale};
    use std::time::Duration;

    fn result(name: &str, confidence: f64) -> DrugScoreResult {
        DrugScoreResult {
            name: name.into(),
            moa: String::new(),
            efficacy_score: 0.5,
            confidence,
            evidence_tier: EvidenceTier::Consider,
            badges: vec![],
            citations: vec![],
            clinvar: None,
            rationale: Rationale::default(),
            insights: None,
            calibration_percentile: None,
        }
    }

    fn panel() -> Vec<DrugConfig> {
        vec![
            DrugConfig::new("Olaparib", "PARP_inhibition", &[("ddr", 0.9)]).with_class("parp"),
            DrugConfig::new("Carboplatin", "platinum_crosslinking", &[("ddr", 0.7)]).with_class("platinum"),
        ]
    }

    fn request(options: EfficacyOptions) -> EfficacyRequest {
        EfficacyRequest::new(vec![brca1()], "evo2_7b", "ovarian_cancer").with_options(options)
    }

    fn brca1() -> Variant {
        Variant::new("BRCA1", "17", 43045712, "A", "G")
    }

    fn provenance() -> Provenance {
        Provenance::new("run", "evo2_7b", "ovarian_cancer", "SPE")
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    #[tokio::test]
    async fn test_cohort_lift_capped() {
        let collab = Collaborators::default().with_cohort(Arc::new(MockCohortProvider::new().with("BRCA1", 0.8)));
        let pp = PostProcessor::new(&collab, ConfidenceConfig::default());
        let mut drugs = vec![result("Olaparib", 0.6), result("Carboplatin", 0.99)];
        let mut prov = provenance();
        let req = request(EfficacyOptions { include_cohort_overlay: true, ..Default::default() });

        let out = pp.run(&req, &req.mutations, &panel(), &mut drugs, &mut prov, far_deadline()).await;
        assert_eq!(out.cohort_signals["BRCA1"], 0.8);
        assert!((drugs[0].confidence - 0.65).abs() < 1e-12);
        assert_eq!(drugs[1].confidence, 1.0);
        assert!(prov.flags[COHORT_FEATURE]);
    }

    #[test]
    fn test_treatment_line_penalty_capped() {
        let mut drugs = vec![result("Olaparib", 0.7), result("Carboplatin", 0.7)];
        let history: Vec<String> = vec!["parp".into(), "Olaparib".into(), "PARP".into()];
        let n = apply_treatment_line(&history, &panel(), &mut drugs, &ConfidenceConfig::default());
        assert_eq!(n, 1);
        assert!((drugs[0].confidence - 0.5).abs() < 1e-12);
        assert_eq!(drugs[0].rationale.adjustments[0].kind, AdjustmentKind::CrossResistance);
        assert_eq!(drugs[1].confidence, 0.7);
    }

    #[tokio::test]
    async fn test_each_failure_omits_only_its_feature() {
        let feature = SaeFeature { index: 7, activation: 0.4, label: None };
        let collab = Collaborators::default()
            .with_cohort(Arc::new(MockCohortProvider::new().failing()))
            .with_calibration(Arc::new(MockCalibrationSource::new()))
            .with_sae(Arc::new(MockSaeExtractor::new(vec![feature])));
        let pp = PostProcessor::new(&collab, ConfidenceConfig::default());
        let mut drugs = vec![result("Olaparib", 0.6), result("Carboplatin", 0.4)];
        let mut prov = provenance();
        let req = request(EfficacyOptions {
            include_cohort_overlay: true,
            include_calibration_snapshot: true,
            include_sae_features: true,
            ..Default::default()
        });

        let out = pp.run(&req, &req.mutations, &panel(), &mut drugs, &mut prov, far_deadline()).await;
        assert_eq!(prov.omitted_features, vec![COHORT_FEATURE.to_string()]);
        assert!(out.cohort_signals.is_empty());
        assert_eq!(drugs[0].confidence, 0.6);
        assert_eq!(drugs[0].calibration_percentile, Some(0.6));
        let sets = out.sae_features.unwrap();
        assert_eq!(sets[0].variant, "17:43045712:A>G");
        assert_eq!(sets[0].features[0].index, 7);
    }

    #[tokio::test]
    async fn test_unconfigured_collaborators_omit() {
        let pp = PostProcessor::new(&Collaborators::default(), ConfidenceConfig::default());
        let mut drugs = vec![result("Olaparib", 0.6), result("Carboplatin", 0.4)];
        let mut prov = provenance();
        let req = request(EfficacyOptions {
            include_calibration_snapshot: true,
            include_sae_features: true,
            ..Default::default()
        });

        let out = pp.run(&req, &req.mutations, &panel(), &mut drugs, &mut prov, far_deadline()).await;
        assert_eq!(prov.omitted_features, vec![CALIBRATION_FEATURE.to_string(), SAE_FEATURE.to_string()]);
        assert!(out.sae_features.is_none());
        assert!(drugs.iter().all(|d| d.calibration_percentile.is_none()));
    }

    #[tokio::test]
    async fn test_nothing_requested_calls_nothing() {
        let cohort = Arc::new(MockCohortProvider::new());
        let collab = Collaborators::default().with_cohort(cohort.clone());
        let pp = PostProcessor::new(&collab, ConfidenceConfig::default());
        let mut drugs = vec![result("Olaparib", 0.6)];
        let mut prov = provenance();
        let req = request(EfficacyOptions::default());
        let out = pp.run(&req, &req.mutations, &panel(), &mut drugs, &mut prov, far_deadline()).await;
        assert_eq!(out, PostProcessOutput::default());
        assert_eq!(cohort.calls(), 0);
        assert!(prov.flags.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cohort_omitted_at_deadline() {
        let cohort = Arc::new(MockCohortProvider::new().with("BRCA1", 0.8).slow(Duration::from_secs(60)));
        let collab = Collaborators::default()
            .with_cohort(cohort.clone())
            .with_calibration(Arc::new(MockCalibrationSource::new()));
        let pp = PostProcessor::new(&collab, ConfidenceConfig::default());
        let mut drugs = vec![result("Olaparib", 0.6), result("Carboplatin", 0.4)];
        let mut prov = provenance();
        let req = request(EfficacyOptions {
            include_cohort_overlay: true,
            include_calibration_snapshot: true,
            ..Default::default()
        });

        let started = Instant::now();
        let deadline = started + Duration::from_secs(2);
        let out = pp.run(&req, &req.mutations, &panel(), &mut drugs, &mut prov, deadline).await;
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(cohort.calls(), 1);
        assert_eq!(prov.omitted_features, vec![COHORT_FEATURE.to_string()]);
        assert!(out.cohort_signals.is_empty());
        assert_eq!(drugs[0].confidence, 0.6);
        // the mock answers immediately, which still counts as in time
        assert_eq!(drugs[0].calibration_percentile, Some(0.6));
        assert!(prov.flags[CALIBRATION_FEATURE]);
    }
}
