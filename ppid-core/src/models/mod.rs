pub mod chunk;
pub mod evaluation;
pub mod recap;
pub mod session;
pub mod settings;
pub mod survey;

pub use chunk::{DocumentChunk, RawDocument, SourceType};
pub use evaluation::{Evaluation, EvaluationStatus, KnowledgeGap};
pub use recap::{Recap, RecapStatus};
pub use session::{BufferedMessage, ConversationSession, Phase, Role};
pub use settings::{Settings, SettingsPatch};
pub use survey::{SurveyResult, SurveyStats};
