//! Experiment catalog: experiment definitions plus the per-variant copy that
//! presentation code renders.
//!
//! Configs are keyed `"<experiment>_<variant>"`. A missing key resolves to an
//! empty bag so presentation always has something to read.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::assigner::VariantAssigner;
use crate::error::{ExperimentError, ExperimentResult};
use crate::experiment::Experiment;

pub const HERO_HEADLINE: &str = "hero_headline";
pub const CTA_TEXT: &str = "cta_text";
pub const PRICING_DISPLAY: &str = "pricing_display";

/// Free-form properties consumed by presentation.
pub type VariantConfig = Map<String, Value>;

pub fn config_key(experiment: &str, variant: &str) -> String {
    format!("{experiment}_{variant}")
}

/// What a component needs to render one experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedExperiment {
    pub experiment: String,
    pub variant: String,
    pub config: VariantConfig,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    experiments: Vec<Experiment>,
    #[serde(default)]
    configs: HashMap<String, VariantConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct ExperimentCatalog {
    experiments: BTreeMap<String, Experiment>,
    configs: HashMap<String, VariantConfig>,
}

impl ExperimentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an experiment. Names must be unique.
    pub fn add_experiment(&mut self, experiment: Experiment) -> ExperimentResult<()> {
        if self.experiments.contains_key(experiment.name()) {
            return Err(ExperimentError::DuplicateExperiment(
                experiment.name().to_string(),
            ));
        }
        self.experiments
            .insert(experiment.name().to_string(), experiment);
        Ok(())
    }

    pub fn add_config(&mut self, experiment: &str, variant: &str, config: VariantConfig) {
        self.configs.insert(config_key(experiment, variant), config);
    }

    pub fn experiment(&self, name: &str) -> Option<&Experiment> {
        self.experiments.get(name)
    }

    pub fn experiments(&self) -> impl Iterator<Item = &Experiment> {
        self.experiments.values()
    }

    /// Copy for `variant` of `experiment`; empty when none is defined.
    pub fn config(&self, experiment: &str, variant: &str) -> VariantConfig {
        self.configs
            .get(&config_key(experiment, variant))
            .cloned()
            .unwrap_or_default()
    }

    /// Assign (or read) the sticky variant and look up its copy.
    pub fn resolve(&self, assigner: &VariantAssigner, experiment: &Experiment) -> ResolvedExperiment {
        let variant = assigner.get_variant(experiment);
        let config = self.config(experiment.name(), &variant);
        if config.is_empty() {
            debug!(experiment = experiment.name(), variant = %variant, "no config for variant");
        }
        ResolvedExperiment {
            experiment: experiment.name().to_string(),
            variant,
            config,
        }
    }

    /// Resolve every experiment in the catalog.
    pub fn resolve_all(&self, assigner: &VariantAssigner) -> Vec<ResolvedExperiment> {
        self.experiments()
            .map(|experiment| self.resolve(assigner, experiment))
            .collect()
    }

    pub fn from_json(raw: &str) -> ExperimentResult<Self> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        let mut catalog = Self::new();
        for experiment in file.experiments {
            catalog.add_experiment(experiment)?;
        }
        catalog.configs = file.configs;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> ExperimentResult<Self> {
        let raw = fs::read_to_string(path)?;
        let catalog = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            experiments = catalog.experiments.len(),
            "experiment catalog loaded"
        );
        Ok(catalog)
    }

    /// The experiments running on the marketing site.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        let experiments = [
            (
                HERO_HEADLINE,
                vec!["original", "benefit_focused", "question_format"],
                vec![0.34, 0.33, 0.33],
            ),
            (
                CTA_TEXT,
                vec!["book_call", "schedule_demo", "get_started"],
                vec![0.34, 0.33, 0.33],
            ),
            (
                PRICING_DISPLAY,
                vec!["inquiry_only", "range_shown"],
                vec![0.5, 0.5],
            ),
        ];
        for (name, variants, weights) in experiments {
            let added = Experiment::new(name, variants, Some(weights))
                .and_then(|experiment| catalog.add_experiment(experiment));
            if let Err(e) = added {
                warn!(experiment = name, error = %e, "built-in experiment rejected");
            }
        }

        let configs = [
            (HERO_HEADLINE, "original", json!({
                "headline": "Bring Modern Computer Science to Your School",
                "subheadline": "Turn-key programming courses taught by real software engineers. Curriculum, LMS, and instructors included.",
            })),
            (HERO_HEADLINE, "benefit_focused", json!({
                "headline": "Launch CS Classes in 48 Hours, No Hiring Required",
                "subheadline": "Expert instructors, production-ready curriculum, and complete LMS. Everything you need to offer world-class computer science education.",
            })),
            (HERO_HEADLINE, "question_format", json!({
                "headline": "Want to Offer CS but Don't Have the Teachers?",
                "subheadline": "We provide experienced software engineers, complete curriculum, and LMS platform. Your students get real coding skills. You get zero hiring headaches.",
            })),
            (CTA_TEXT, "book_call", json!({
                "primary": "Book an Information Call",
                "secondary": "View Course Catalog",
                "nav": "Book a Call",
            })),
            (CTA_TEXT, "schedule_demo", json!({
                "primary": "Schedule a Demo",
                "secondary": "View Course Catalog",
                "nav": "Schedule Demo",
            })),
            (CTA_TEXT, "get_started", json!({
                "primary": "Get Started Today",
                "secondary": "View Course Catalog",
                "nav": "Get Started",
            })),
            (PRICING_DISPLAY, "inquiry_only", json!({
                "showPricing": false,
                "message": "Per-student or per-classroom pricing available. Contact us for a custom quote.",
            })),
            (PRICING_DISPLAY, "range_shown", json!({
                "showPricing": true,
                "message": "Starting at $50/student/semester or $1,500/classroom. Volume discounts available.",
            })),
        ];
        for (experiment, variant, config) in configs {
            if let Value::Object(config) = config {
                catalog.add_config(experiment, variant, config);
            }
        }
        catalog
    }
}
