//! Concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements         | Connects to                 |
//! |---------------|--------------------|-----------------------------|
//! | `thingsboard` | AuthPort           | ThingsBoard REST API        |
//! |               | TelemetryPort      |                             |
//! |               | CommandPort        |                             |
//! | `ollama`      | OraclePort         | Ollama `/api/chat`          |
//! | `log_sink`    | EventSink          | `log` facade                |
//! | `time`        | TimePort           | `std::time::Instant`        |
//! | `env_config`  | ConfigPort         | JSON file + environment     |

pub mod env_config;
pub mod log_sink;
pub mod ollama;
pub mod thingsboard;
pub mod time;
