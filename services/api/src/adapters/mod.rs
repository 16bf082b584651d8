pub mod completion_llm;
pub mod console_notifier;
pub mod db;
pub mod local_storage;
pub mod product_data;
pub mod session_auth;

pub use completion_llm::OpenAiCompletionAdapter;
pub use console_notifier::ConsoleNotifier;
pub use db::DbAdapter;
pub use local_storage::FileLocalStorage;
pub use product_data::RapidApiProductAdapter;
pub use session_auth::SessionAuth;
