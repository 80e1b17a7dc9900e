pub const SELECTION_WINDOW_CAPACITY: usize = 2;

pub const DESCRIPTION_MIN_CHARS: usize = 5;

pub const MODEL_FILE_EXTENSION: &str = "gguf";
pub const MODEL_LOG_SUFFIX: &str = ".log";

pub const DEFAULTS_FILE_NAME: &str = "defaults.json";
pub const HISTORY_FILE_NAME: &str = "history.json";

pub const ENV_CONFIG_DIR: &str = "INFERENCE_DECK_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "INFERENCE_DECK_DATA_DIR";
pub const ENV_MODEL_DIR: &str = "INFERENCE_DECK_MODEL_DIR";

pub const DIFF_DELETE_STYLE: &str = "background:#ffe6e6;";
pub const DIFF_INSERT_STYLE: &str = "background:#e6ffe6;";
