mod article;
mod event;
mod recommendation;

pub use article::{Article, NewArticle};
pub use event::{
    FeedbackChange, FeedbackEvent, FeedbackIntent, FeedbackType, InteractionEvent,
    InteractionKind, NewInteraction, SearchEvent,
};
pub use recommendation::{Algorithm, RecommendationEntry};
