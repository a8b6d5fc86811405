pub mod classifier;
pub mod filters;
pub mod intent;
pub mod normalize;
pub mod postprocess;
pub mod product;
pub mod state;
pub mod vocabulary;

pub use classifier::{IntentRule, RuleContext, classify, rules};
pub use filters::{FilterSet, FilterValue, extract, merge};
pub use intent::{Intent, IntentType};
pub use normalize::{Normalized, normalize};
pub use postprocess::{Adjustment, apply_post_rules};
pub use product::Product;
pub use state::{ConversationState, FeatureOffer, GuidanceFlow, GuidancePhase, SetupKind};
pub use vocabulary::{DimensionSchema, MergeMode, Vocabulary, VocabularyError};
