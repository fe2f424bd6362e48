//! # Kestrel Modules
//!
//! The feature modules bundled with the gateway. Each one implements
//! [`Module`](kestrel_runtime::Module): it builds its pipelines from the
//! framework middlewares and declares the slash commands they serve.
//!
//! | Module             | Commands                            | Events                              |
//! |--------------------|-------------------------------------|-------------------------------------|
//! | [`DebugModule`]    | `ping`, `error-test`, `feature`, `restart` | `Ready`, `MessageCreate`     |
//! | [`ExtraModule`]    | `say`, `create-forum`               | `MessageCreate`                     |
//! | [`WhitelistModule`]| `whitelist`                         | `GuildMemberAdd`, `GuildBanAdd`     |
//! | [`LedgerModule`]   | `ledger`                            | `MessageCreate/Update/Delete`       |
//!
//! ```rust,ignore
//! let features = Arc::new(InMemoryFeatureStore::new());
//! for feature in DebugModule::features().into_iter().chain(ExtraModule::features()) {
//!     features.register(feature);
//! }
//!
//! runtime.register_module(&DebugModule::new(&config, features.clone(), shutdown))?;
//! runtime.register_module(&ExtraModule::new(&config, features))?;
//! ```

pub mod debug;
pub mod extra;
pub mod ledger;
pub mod whitelist;

mod util;

pub use debug::DebugModule;
pub use extra::ExtraModule;
pub use ledger::{
    CachedMessage, InMemoryLedgerStore, LedgerError, LedgerModule, LedgerSettings, LedgerStore,
};
pub use whitelist::{
    InMemoryWhitelistStore, WhitelistError, WhitelistModule, WhitelistSettings, WhitelistStore,
};
