pub mod admin;
pub mod ai;
pub mod api;
pub mod config;
pub mod error;
pub mod format;
pub mod job;
pub mod notice;
pub mod optimistic;
pub mod poller;
pub mod session;
pub mod wire;
pub mod workspace;

pub use admin::{AdminAccount, Application, ApplicationStatus, DashboardOverview, DashboardStats,
               NewAdmin, UserAction, UserSummary};
pub use ai::{ChatReply, ChatRequest, FilePreview, HealthSnapshot, SearchHit, VectorDbStatus};
pub use api::ApiClient;
pub use config::{ApiConfig, PollingConfig};
pub use error::{ApiError, ErrorCategory};
pub use format::{format_response, parse_blocks, parse_troubleshooting, Block, FormattedResponse,
                 Troubleshooting};
pub use job::{any_active, JobLike, JobStatus, TrainingJob, TrainingRequest, UploadedFile};
pub use notice::{Notice, NotificationSink, Severity};
pub use optimistic::{
    apply_optimistic_list_update, ListLoader, ListRecord, Mutation, OptimisticList,
};
pub use poller::{poll_until_terminal, JobPoller, Refresh};
pub use session::SessionProvider;
pub use wire::ParseError;
pub use workspace::TrainingWorkspace;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

// Environment overrides
pub const API_URL_ENV: &str = "ASSISTDESK_API_URL";
pub const TOKEN_ENV: &str = "ASSISTDESK_TOKEN";
pub const TOKEN_FILE_ENV: &str = "ASSISTDESK_TOKEN_FILE";

// Production paths for the watcher daemon
pub const DEFAULT_CONFIG_PATH: &str = "/etc/assistdesk/watcher.yaml";
pub const DEFAULT_LOG_FILE: &str = "/var/log/assistdesk/watcher.log";
pub const DEFAULT_EVENTS_LOG_FILE: &str = "/var/log/assistdesk/events.log";

// Fallback paths for non-root users
pub const USER_CONFIG_PATH: &str = "~/.config/assistdesk/watcher.yaml";
pub const USER_TOKEN_FILE: &str = "~/.config/assistdesk/auth_token";
pub const USER_LOG_FILE: &str = "assistdesk-watcher.log";
pub const USER_EVENTS_LOG_FILE: &str = "assistdesk-events.log";

/// Expand a leading `~/` against `$HOME`.
pub fn expand_home(path: &str) -> std::path::PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => std::path::PathBuf::from(home).join(rest),
        _ => std::path::PathBuf::from(path),
    }
}
