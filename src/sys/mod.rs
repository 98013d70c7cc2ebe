// 🛡️ Zero-Trust Architecture: every shell-facing value passes through `safety`.

pub mod traits;      // Runtime & operator contracts
pub mod env;         // .env parsing
pub mod credentials; // DB credential extraction
pub mod safety;      // Escaping & validators
pub mod secrets;     // Scoped MySQL option files
pub mod detect;      // Stack classification
pub mod scheduler;   // Cron line synthesis
pub mod build;       // Node/yarn asset pipeline
pub mod systemd;     // Service restarts
pub mod stage;       // Stage fan-out prompt
pub mod transport;   // ssh/rsync runtime
