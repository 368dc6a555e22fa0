//! Disease-keyed drug panels.
//!
//! Built-in panels cover multiple myeloma, ovarian cancer, and melanoma. More
//! can be merged from a YAML file:
//!
//! ```yaml
//! panels:
//!   breast_cancer:
//!     - name: Alpelisib
//!       moa: PI3Kα inhibitor
//!       pathway_weights: { pi3k: 0.9 }
//!       target_genes: [PIK3CA]
//!       drug_class: pi3k
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use efficacy_common::{DrugConfig, EfficacyError, Result};

use crate::pathway::{DDR, PI3K, RAS_MAPK, TP53};

/// Panel used when the disease has no panel of its own.
pub const DEFAULT_PANEL: &str = "multiple_myeloma";

#[derive(Debug, Deserialize)]
struct PanelFile {
    #[serde(default)]
    panels: BTreeMap<String, Vec<DrugConfig>>,
}

/// Lowercase, with spaces and hyphens folded to underscores.
pub fn normalise_disease(disease: &str) -> String {
    disease.trim().to_lowercase().replace([' ', '-'], "_")
}

fn alias(disease: &str) -> &str {
    match disease {
        "mm" | "myeloma" => "multiple_myeloma",
        "ovarian" | "hgsoc" | "ovarian_carcinoma" => "ovarian_cancer",
        "cutaneous_melanoma" | "skcm" => "melanoma",
        other => other,
    }
}

fn multiple_myeloma() -> Vec<DrugConfig> {
    vec![
        DrugConfig::new("BRAF inhibitor", "BRAF_inhibition", &[(RAS_MAPK, 0.8), (TP53, 0.2)])
            .with_targets(&["BRAF"])
            .with_class("braf"),
        DrugConfig::new("MEK inhibitor", "MEK_inhibition", &[(RAS_MAPK, 0.9), (TP53, 0.1)])
            .with_targets(&["MAP2K1", "KRAS", "NRAS"])
            .with_class("mek"),
        DrugConfig::new("IMiD", "immunomodulator", &[(RAS_MAPK, 0.2), (TP53, 0.3)]).with_class("imid"),
        DrugConfig::new("Proteasome inhibitor", "proteasome_inhibition", &[(RAS_MAPK, 0.3), (TP53, 0.4)])
            .with_class("proteasome"),
        DrugConfig::new("Anti-CD38", "antiCD38", &[(RAS_MAPK, 0.1), (TP53, 0.1)]).with_class("anti_cd38"),
    ]
}

fn ovarian_cancer() -> Vec<DrugConfig> {
    vec![
        DrugConfig::new("Olaparib", "PARP_inhibition", &[(DDR, 0.9)])
            .with_targets(&["BRCA1", "BRCA2"])
            .with_class("parp"),
        DrugConfig::new("Niraparib", "PARP_inhibition", &[(DDR, 0.85)])
            .with_targets(&["BRCA1", "BRCA2"])
            .with_class("parp"),
        DrugConfig::new("Carboplatin", "platinum_crosslinking", &[(DDR, 0.7), (TP53, 0.2)]).with_class("platinum"),
        DrugConfig::new("Ceralasertib", "ATR_inhibition", &[(DDR, 0.6)])
            .with_targets(&["ARID1A", "ATM"])
            .with_class("atr"),
        DrugConfig::new("Alpelisib", "PI3K_inhibition", &[(PI3K, 0.9)])
            .with_targets(&["PIK3CA"])
            .with_class("pi3k"),
        DrugConfig::new("Bevacizumab", "VEGF_inhibition", &[(TP53, 0.2), (PI3K, 0.1)]).with_class("anti_vegf"),
    ]
}

fn melanoma() -> Vec<DrugConfig> {
    vec![
        DrugConfig::new("BRAF inhibitor", "BRAF_inhibition", &[(RAS_MAPK, 0.9)])
            .with_targets(&["BRAF"])
            .with_class("braf"),
        DrugConfig::new("MEK inhibitor", "MEK_inhibition", &[(RAS_MAPK, 0.85)])
            .with_targets(&["NRAS", "MAP2K1"])
            .with_class("mek"),
        DrugConfig::new("Anti-PD-1", "checkpoint_inhibition", &[(TP53, 0.1), (RAS_MAPK, 0.1)]).with_class("pd1"),
    ]
}

#[derive(Debug, Clone)]
pub struct PanelRegistry {
    panels: BTreeMap<String, Vec<DrugConfig>>,
}

impl Default for PanelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PanelRegistry {
    pub fn builtin() -> Self {
        let mut panels = BTreeMap::new();
        panels.insert("multiple_myeloma".to_string(), multiple_myeloma());
        panels.insert("ovarian_cancer".to_string(), ovarian_cancer());
        panels.insert("melanoma".to_string(), melanoma());
        Self { panels }
    }

    /// Merge panels from YAML; a panel with an existing key replaces it.
    pub fn merge_yaml_str(&mut self, content: &str) -> Result<usize> {
        let file: PanelFile = serde_yaml::from_str(content)
            .map_err(|e| EfficacyError::Configuration(format!("invalid panel file: {e}")))?;
        let n = file.panels.len();
        for (disease, drugs) in file.panels {
            self.panels.insert(normalise_disease(&disease), drugs);
        }
        Ok(n)
    }

    pub fn merge_yaml_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EfficacyError::Configuration(format!("cannot read panel file {}: {e}", path.display()))
        })?;
        let n = self.merge_yaml_str(&content)?;
        info!(path = %path.display(), panels = n, "Loaded drug panels");
        Ok(n)
    }

    pub fn diseases(&self) -> impl Iterator<Item = &str> {
        self.panels.keys().map(String::as_str)
    }

    /// Panel for `disease`, falling back to the default panel.
    pub fn panel(&self, disease: &str) -> Vec<DrugConfig> {
        let key = normalise_disease(disease);
        if let Some(drugs) = self.panels.get(alias(&key)) {
            return drugs.clone();
        }
        warn!(disease, fallback = DEFAULT_PANEL, "No drug panel for disease; using default");
        self.panels.get(DEFAULT_PANEL).cloned().unwrap_or_default()
    }

    /// Panel truncated to the first `limit` drugs.
    pub fn panel_limited(&self, disease: &str, limit: Option<usize>) -> Vec<DrugConfig> {
        let mut drugs = self.panel(disease);
        if let Some(limit) = limit {
            drugs.truncate(limit);
        }
        drugs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_and_default() {
        let reg = PanelRegistry::builtin();
        assert_eq!(reg.panel("Multiple Myeloma").len(), 5);
        assert_eq!(reg.panel("MM")[0].name, "BRAF inhibitor");
        assert_eq!(reg.panel("ovarian")[0].name, "Olaparib");
        assert_eq!(reg.panel("glioblastoma"), reg.panel("multiple_myeloma"));
    }

    #[test]
    fn test_limit() {
        let reg = PanelRegistry::builtin();
        assert_eq!(reg.panel_limited("ovarian_cancer", Some(2)).len(), 2);
        assert_eq!(reg.panel_limited("ovarian_cancer", None).len(), 6);
    }

    #[test]
    fn test_yaml_merge() {
        let mut reg = PanelRegistry::builtin();
        let n = reg
            .merge_yaml_str(
                r#"
panels:
  Breast Cancer:
    - name: Alpelisib
      moa: PI3K_inhibition
      pathway_weights: { pi3k: 0.9 }
      target_genes: [PIK3CA]
      drug_class: pi3k
"#,
            )
            .unwrap();
        assert_eq!(n, 1);
        let panel = reg.panel("breast-cancer");
        assert_eq!(panel.len(), 1);
        assert!(panel[0].class_is("PI3K"));
        assert!(reg.merge_yaml_str("panels: [").is_err());
    }
}
