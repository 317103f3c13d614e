//! Fleet specification.
//!
//! A fleet is a named set of bots sharing an image, storage, security
//! profile, resource profile and environment defaults. This crate owns:
//!
//! - The TOML-facing types ([`FleetSpec`], [`BotSpec`], [`PlatformConfig`]).
//! - Parsing of the small value languages inside the spec: resource
//!   quantities, cron expressions, bot names.
//! - [`resolve`]: validation plus the defaulting/merge stage whose output
//!   ([`ResolvedFleet`]) every renderer consumes.
//!
//! # Invariants
//!
//! - Bot names are unique, and so are the identities derived from them.
//! - Disabled bots never reach [`ResolvedFleet::bots`].
//! - A resolved bot's requests never exceed its limits.

mod cron;
mod error;
mod name;
mod quantity;
mod resolve;
mod types;

pub use cron::CronExpr;
pub use error::{CronError, QuantityError, SpecValidationError};
pub use name::{validate_identity, validate_slug, BotName, MAX_IDENTITY_LENGTH, MAX_NAME_LENGTH};
pub use quantity::Quantity;
pub use resolve::{
    default_hashtags, is_reserved_env_key, resolve, validate_env_key, CacheConnection, DatabaseConnection,
    MediaSettings, ResolvedBot, ResolvedDefaults, ResolvedFleet, ResolvedPlatform,
    ResolvedResources, SpecWarning, DEFAULT_DESCRIPTION, ENV_AUTO_PUBLISH, ENV_LOG_LEVEL,
    ENV_VIDEO_DURATION, ENV_VIDEO_FPS, ENV_VIDEO_HEIGHT, ENV_VIDEO_WIDTH, MAX_REPLICAS,
    RESERVED_ENV_KEYS, RESERVED_ENV_PREFIX,
};
pub use types::{
    BotSpec, CacheSpec, DatabaseSpec, FleetDefaults, FleetSpec, HealthSpec, InfraSpec,
    PlatformConfig, ResourceList, ResourceSpec, SecretKeyRef, SecurityProfile, StorageDefaults,
};
