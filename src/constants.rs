/// Constants module to avoid magic numbers in the codebase

// Routing API
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_OPENROUTER_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const DEFAULT_REFERER: &str = "http://localhost:3000";
pub const DEFAULT_APP_TITLE: &str = "AI Model Comparison Tool";
pub const OPENROUTER_KEYS_URL: &str = "https://openrouter.ai/keys";

// Completion request defaults
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const NO_RESPONSE_SENTINEL: &str = "No response received";

// Timeouts
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const SHUTDOWN_FLUSH_TIMEOUT_SECS: u64 = 5;

// Hosted backend
pub const DEFAULT_SUPABASE_URL_ENV: &str = "SUPABASE_URL";
pub const DEFAULT_SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";
pub const DEFAULT_HISTORY_TABLE: &str = "chat_history";
pub const DEFAULT_LOCAL_HISTORY_DIR: &str = ".chorus/history";
pub const DEFAULT_LOCAL_PROFILE: &str = "local";

// Reveal animation
pub const DEFAULT_REVEAL_CHARS_PER_TICK: usize = 1;
pub const DEFAULT_REVEAL_TICK_MS: u64 = 1;

// UI Configuration
pub const UI_REFRESH_INTERVAL_MS: u64 = 50;
pub const UI_SCROLL_LINES: u16 = 3;
pub const UI_COLLAPSED_PANEL_WIDTH: u16 = 6;
pub const DEFAULT_MAX_SELECTED_MODELS: usize = 5;
pub const HISTORY_PREVIEW_CHARS: usize = 50;

// Rough token estimate used in the panels (~4 characters per token)
pub const CHARS_PER_TOKEN_ESTIMATE: usize = 4;
