//! Evidence and insight fan-out.
//!
//! Literature (one lookup per drug) and the ClinVar prior form the evidence
//! branch; the insight bundle is a second branch. Both run concurrently under
//! one deadline. A branch that misses the deadline yields empty signals and a
//! fallback reason, never an error. The orchestrator hands the same deadline
//! on to post-processing.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, warn};

use efficacy_cache::CacheService;
use efficacy_common::{
    ClinVarPrior, DrugConfig, EfficacyError, EfficacyOptions, EvidenceResult, FallbackReason, Gathered,
    InsightScores, Result, Variant,
};

use crate::collaborators::{ClinVarProvider, Collaborators, InsightsProvider, LiteratureProvider, LiteratureQuery};

/// Which branches a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidencePlan {
    pub literature: bool,
    pub clinvar: bool,
    pub insights: bool,
}

impl EvidencePlan {
    /// Plan plus the reasons any branch was switched off by the request.
    pub fn from_options(opts: &EfficacyOptions) -> (Self, Vec<FallbackReason>) {
        let mut reasons = Vec::new();
        let evidence = opts.ablation_mode.evidence;
        if !evidence {
            reasons.push(FallbackReason::EvidenceAblated);
        }
        if opts.fast {
            reasons.push(FallbackReason::FastMode);
        } else if evidence && opts.disable_literature {
            reasons.push(FallbackReason::LiteratureDisabled);
        }
        let plan = Self {
            literature: evidence && !opts.fast && !opts.disable_literature,
            clinvar: evidence,
            insights: !opts.fast && opts.ablation_mode.sequence,
        };
        (plan, reasons)
    }

    pub fn is_empty(&self) -> bool {
        !(self.literature || self.clinvar || self.insights)
    }
}

/// Everything the fan-out produced. `literature[i]` belongs to `drugs[i]`.
#[derive(Debug, Clone, Default)]
pub struct EvidenceBundle {
    pub literature: Vec<Option<EvidenceResult>>,
    pub clinvar: Option<ClinVarPrior>,
    pub insights: Option<InsightScores>,
    pub reasons: Vec<FallbackReason>,
    pub elapsed_ms: u64,
}

impl EvidenceBundle {
    pub fn empty(drugs: usize) -> Self {
        Self { literature: vec![None; drugs], ..Default::default() }
    }
}

#[derive(Debug, Clone, Default)]
struct EvidenceSignals {
    literature: Vec<Option<EvidenceResult>>,
    clinvar: Option<ClinVarPrior>,
}

pub struct EvidenceGatherer {
    literature: Option<Arc<dyn LiteratureProvider>>,
    clinvar: Option<Arc<dyn ClinVarProvider>>,
    insights: Option<Arc<dyn InsightsProvider>>,
    cache: Option<Arc<CacheService>>,
    deadline: Duration,
}

impl EvidenceGatherer {
    pub fn new(collaborators: &Collaborators, deadline: Duration) -> Self {
        Self {
            literature: collaborators.literature.clone(),
            clinvar: collaborators.clinvar.clone(),
            insights: collaborators.insights.clone(),
            cache: None,
            deadline,
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheService>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run the planned branches for `primary` against `drugs`, starting the
    /// configured deadline now.
    pub async fn gather(
        &self,
        primary: &Variant,
        disease: &str,
        drugs: &[DrugConfig],
        plan: EvidencePlan,
    ) -> EvidenceBundle {
        self.gather_until(primary, disease, drugs, plan, Instant::now() + self.deadline)
            .await
    }

    /// Run the planned branches against an externally owned deadline.
    #[instrument(skip(self, primary, drugs, deadline), fields(gene = %primary.gene, drugs = drugs.len()))]
    pub async fn gather_until(
        &self,
        primary: &Variant,
        disease: &str,
        drugs: &[DrugConfig],
        plan: EvidencePlan,
        deadline: Instant,
    ) -> EvidenceBundle {
        let started = Instant::now();

        let (evidence, insights) = tokio::join!(
            self.evidence_branch(primary, disease, drugs, plan, deadline),
            self.insights_branch(primary, plan, deadline),
        );

        let mut reasons = Vec::new();
        reasons.extend(evidence.reason());
        reasons.extend(insights.reason());
        let evidence = evidence.into_value();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(elapsed_ms, reasons = ?reasons, "Evidence fan-out finished");

        EvidenceBundle {
            literature: evidence.literature,
            clinvar: evidence.clinvar,
            insights: insights.into_value(),
            reasons,
            elapsed_ms,
        }
    }

    async fn evidence_branch(
        &self,
        primary: &Variant,
        disease: &str,
        drugs: &[DrugConfig],
        plan: EvidencePlan,
        deadline: Instant,
    ) -> Gathered<EvidenceSignals> {
        let started = Instant::now();
        let empty = EvidenceSignals { literature: vec![None; drugs.len()], clinvar: None };
        let literature = if plan.literature { self.literature.as_deref() } else { None };
        let clinvar = if plan.clinvar { self.clinvar.as_deref() } else { None };
        if literature.is_none() && clinvar.is_none() {
            return Gathered::Complete(empty);
        }

        let lookups = async {
            match literature {
                Some(provider) => {
                    let per_drug = drugs.iter().map(|drug| self.literature_for(provider, primary, disease, drug));
                    Some(join_all(per_drug).await)
                }
                None => None,
            }
        };
        let prior = async {
            match clinvar {
                Some(provider) => Some(provider.prior(primary).await),
                None => None,
            }
        };

        let Ok((lit, prior)) = timeout_at(deadline, async { tokio::join!(lookups, prior) }).await else {
            let err = EfficacyError::Timeout {
                stage: "evidence".into(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            warn!(error = %err, "Evidence fan-out missed its deadline");
            return Gathered::degraded(empty, FallbackReason::EvidenceTimeout);
        };

        let mut reason = None;
        let mut signals = empty;
        if let Some(results) = lit {
            let mut failed = 0;
            // join_all preserves input order, so results[i] is drugs[i].
            for (slot, (result, drug)) in signals.literature.iter_mut().zip(results.into_iter().zip(drugs)) {
                match result {
                    Ok(ev) => *slot = Some(ev),
                    Err(e) => {
                        warn!(drug = %drug.name, error = %e, "Literature lookup failed");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                reason = Some(FallbackReason::EvidenceUnavailable);
            }
        }
        match prior {
            Some(Ok(p)) => signals.clinvar = p,
            Some(Err(e)) => {
                warn!(error = %e, "ClinVar prior unavailable");
                reason.get_or_insert(FallbackReason::ClinvarUnavailable);
            }
            None => {}
        }

        match reason {
            Some(r) => Gathered::degraded(signals, r),
            None => Gathered::Complete(signals),
        }
    }

    async fn literature_for(
        &self,
        provider: &dyn LiteratureProvider,
        primary: &Variant,
        disease: &str,
        drug: &DrugConfig,
    ) -> Result<EvidenceResult> {
        let query = LiteratureQuery {
            gene: primary.gene.clone(),
            hgvs_p: primary.hgvs_p.clone(),
            disease: disease.to_string(),
            drug_name: drug.name.clone(),
            moa: drug.moa.clone(),
        };
        match &self.cache {
            Some(cache) => {
                let key = CacheService::key(
                    "evidence",
                    &[&query.gene, query.hgvs_p.as_deref().unwrap_or(""), &query.disease, &query.drug_name],
                );
                cache
                    .with_single_flight(&key, cache.config().lock_ttl, || provider.search(&query))
                    .await
            }
            None => provider.search(&query).await,
        }
    }

    async fn insights_branch(
        &self,
        primary: &Variant,
        plan: EvidencePlan,
        deadline: Instant,
    ) -> Gathered<Option<InsightScores>> {
        let provider = match (&self.insights, plan.insights) {
            (Some(p), true) => p,
            _ => return Gathered::Complete(None),
        };
        match timeout_at(deadline, provider.insights(primary)).await {
            Ok(Ok(scores)) => Gathered::Complete(Some(scores)),
            Ok(Err(e)) => {
                warn!(error = %e, "Insight bundle unavailable");
                Gathered::degraded(None, FallbackReason::InsightsUnavailable)
            }
            Err(_) => {
                warn!("Insight bundle missed the evidence deadline");
                Gathered::degraded(None, FallbackReason::InsightsTimeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockClinVarProvider, MockInsightsProvider, MockLiteratureProvider};
    use efficacy_common::{AblationMode, ClinVarClassification};

    fn drugs() -> Vec<DrugConfig> {
        vec![
            DrugConfig::new("Olaparib", "PARP_inhibition", &[("ddr", 0.9)]),
            DrugConfig::new("Niraparib", "PARP_inhibition", &[("ddr", 0.85)]),
            DrugConfig::new("Carboplatin", "platinum_crosslinking", &[("ddr", 0.7)]),
        ]
    }

    fn brca1() -> Variant {
        Variant::new("BRCA1", "17", 43045712, "A", "G").with_hgvs_p("p.C61G")
    }

    fn full_plan() -> EvidencePlan {
        EvidencePlan { literature: true, clinvar: true, insights: true }
    }

    #[test]
    fn test_plan_from_options() {
        let (plan, reasons) = EvidencePlan::from_options(&EfficacyOptions::default());
        assert_eq!(plan, full_plan());
        assert!(reasons.is_empty());

        let opts = EfficacyOptions { fast: true, ..Default::default() };
        let (plan, reasons) = EvidencePlan::from_options(&opts);
        assert!(!plan.literature && plan.clinvar && !plan.insights);
        assert_eq!(reasons, vec![FallbackReason::FastMode]);

        let opts = EfficacyOptions { ablation_mode: "SP".parse().unwrap(), ..Default::default() };
        let (plan, reasons) = EvidencePlan::from_options(&opts);
        assert!(!plan.literature && !plan.clinvar && plan.insights);
        assert_eq!(reasons, vec![FallbackReason::EvidenceAblated]);

        let opts = EfficacyOptions {
            ablation_mode: AblationMode { sequence: false, pathway: true, evidence: true },
            disable_literature: true,
            ..Default::default()
        };
        let (plan, reasons) = EvidencePlan::from_options(&opts);
        assert!(!plan.literature && plan.clinvar && !plan.insights);
        assert_eq!(reasons, vec![FallbackReason::LiteratureDisabled]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_align_with_drug_order() {
        // Later drugs answer first; alignment must follow the panel, not arrival.
        let lit = MockLiteratureProvider::new()
            .with("Olaparib", 0.9)
            .with_delay("Olaparib", Duration::from_millis(300))
            .with("Niraparib", 0.5)
            .with_delay("Niraparib", Duration::from_millis(200))
            .with("Carboplatin", 0.1);
        let collab = Collaborators::default().with_literature(Arc::new(lit));
        let gatherer = EvidenceGatherer::new(&collab, Duration::from_secs(5));

        let bundle = gatherer.gather(&brca1(), "ovarian_cancer", &drugs(), full_plan()).await;
        let strengths: Vec<f64> = bundle.literature.iter().map(|e| e.as_ref().unwrap().strength).collect();
        assert_eq!(strengths, vec![0.9, 0.5, 0.1]);
        assert!(bundle.reasons.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_empty_evidence() {
        let lit = Arc::new(MockLiteratureProvider::new().with("Olaparib", 0.9).slow(Duration::from_secs(60)));
        let clinvar = MockClinVarProvider::new().with(
            "BRCA1",
            ClinVarPrior::new(ClinVarClassification::Pathogenic, "reviewed by expert panel", 0.2),
        );
        let collab = Collaborators::default()
            .with_literature(lit.clone())
            .with_clinvar(Arc::new(clinvar));
        let gatherer = EvidenceGatherer::new(&collab, Duration::from_millis(500));

        let bundle = gatherer.gather(&brca1(), "ovarian_cancer", &drugs(), full_plan()).await;
        assert_eq!(bundle.reasons, vec![FallbackReason::EvidenceTimeout]);
        assert!(bundle.literature.iter().all(Option::is_none));
        assert!(bundle.clinvar.is_none());
        assert_eq!(bundle.literature.len(), 3);
        assert_eq!(lit.calls(), 3);
        assert!(bundle.elapsed_ms < 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_deadline_overrides_configured() {
        let lit = MockLiteratureProvider::new().with("Olaparib", 0.9).slow(Duration::from_secs(1));
        let collab = Collaborators::default().with_literature(Arc::new(lit));
        let gatherer = EvidenceGatherer::new(&collab, Duration::from_secs(5));

        let deadline = Instant::now() + Duration::from_millis(200);
        let bundle = gatherer
            .gather_until(&brca1(), "ovarian_cancer", &drugs(), full_plan(), deadline)
            .await;
        assert_eq!(bundle.reasons, vec![FallbackReason::EvidenceTimeout]);
        assert!(bundle.elapsed_ms < 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insights_timeout_is_separate() {
        let collab = Collaborators::default()
            .with_literature(Arc::new(MockLiteratureProvider::new().with("Olaparib", 0.8)))
            .with_insights(Arc::new(
                MockInsightsProvider::new(InsightScores::default()).slow(Duration::from_secs(10)),
            ));
        let gatherer = EvidenceGatherer::new(&collab, Duration::from_secs(1));

        let bundle = gatherer.gather(&brca1(), "ovarian_cancer", &drugs(), full_plan()).await;
        assert_eq!(bundle.reasons, vec![FallbackReason::InsightsTimeout]);
        assert_eq!(bundle.literature[0].as_ref().unwrap().strength, 0.8);
        assert!(bundle.insights.is_none());
    }

    #[tokio::test]
    async fn test_upstream_failures_degrade() {
        let collab = Collaborators::default()
            .with_literature(Arc::new(MockLiteratureProvider::new().failing()))
            .with_clinvar(Arc::new(MockClinVarProvider::new().failing()))
            .with_insights(Arc::new(MockInsightsProvider::new(InsightScores::default()).failing()));
        let gatherer = EvidenceGatherer::new(&collab, Duration::from_secs(5));

        let bundle = gatherer.gather(&brca1(), "ovarian_cancer", &drugs(), full_plan()).await;
        assert_eq!(
            bundle.reasons,
            vec![FallbackReason::EvidenceUnavailable, FallbackReason::InsightsUnavailable]
        );
        assert!(bundle.clinvar.is_none());
    }

    #[tokio::test]
    async fn test_planned_off_branches_are_not_called() {
        let lit = Arc::new(MockLiteratureProvider::new());
        let clinvar = Arc::new(MockClinVarProvider::new());
        let collab = Collaborators::default().with_literature(lit.clone()).with_clinvar(clinvar.clone());
        let gatherer = EvidenceGatherer::new(&collab, Duration::from_secs(5));
        let plan = EvidencePlan { literature: false, clinvar: true, insights: false };

        let bundle = gatherer.gather(&brca1(), "ovarian_cancer", &drugs(), plan).await;
        assert_eq!(lit.calls(), 0);
        assert_eq!(clinvar.calls(), 1);
        assert_eq!(bundle.literature.len(), 3);
    }

    #[tokio::test]
    async fn test_literature_cached_per_drug() {
        let lit = Arc::new(MockLiteratureProvider::new().with("Olaparib", 0.7));
        let collab = Collaborators::default().with_literature(lit.clone());
        let cache = Arc::new(CacheService::in_memory(&Default::default()));
        let gatherer = EvidenceGatherer::new(&collab, Duration::from_secs(5)).with_cache(cache);
        let plan = EvidencePlan { literature: true, clinvar: false, insights: false };

        gatherer.gather(&brca1(), "ovarian_cancer", &drugs(), plan).await;
        let second = gatherer.gather(&brca1(), "ovarian_cancer", &drugs(), plan).await;
        assert_eq!(lit.calls(), 3);
        assert_eq!(second.literature[0].as_ref().unwrap().strength, 0.7);
    }
}
