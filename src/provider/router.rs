//! Cost-aware model selection: downgrades tier once cumulative spend
//! crosses a threshold.

use super::types::{ModelSpec, ModelTier, Provider};

/// Picks the model used for a given provider/tier, downgrading to the next
/// cheaper tier once `cumulative_cost_usd` has crossed
/// `model_downgrade_threshold_usd`.
pub struct ModelRouter {
    pub model_downgrade_threshold_usd: f64,
}

impl ModelRouter {
    pub fn new(model_downgrade_threshold_usd: f64) -> Self {
        Self {
            model_downgrade_threshold_usd,
        }
    }

    /// Returns `(model, downgraded)`. `requested_tier` is the tier the
    /// caller would use absent any cost pressure.
    pub fn select_model(
        &self,
        provider: Provider,
        requested_tier: ModelTier,
        cumulative_cost_usd: f64,
    ) -> (ModelSpec, bool) {
        let downgrade = cumulative_cost_usd >= self.model_downgrade_threshold_usd;
        let effective_tier = if downgrade {
            Self::next_cheaper_tier(requested_tier)
        } else {
            requested_tier
        };
        let model = Self::model_for(provider, effective_tier);
        (model, downgrade && effective_tier != requested_tier)
    }

    fn next_cheaper_tier(tier: ModelTier) -> ModelTier {
        match tier {
            ModelTier::Flagship => ModelTier::Balanced,
            ModelTier::Balanced => ModelTier::Fast,
            ModelTier::Fast => ModelTier::Fast,
        }
    }

    fn model_for(provider: Provider, tier: ModelTier) -> ModelSpec {
        match (provider, tier) {
            (Provider::Anthropic, ModelTier::Fast) => ModelSpec::claude_haiku(),
            (Provider::Anthropic, _) => ModelSpec::claude_sonnet(),
            (Provider::OpenAI, ModelTier::Fast) => ModelSpec::gpt4o_mini(),
            (Provider::OpenAI, _) => ModelSpec::gpt4o(),
            #[cfg(feature = "gemini")]
            (Provider::Google, _) => ModelSpec::gemini_1_5_pro(),
        }
    }
}
