//! Stage one of rendering: validate the spec and merge defaults.
//!
//! Both the runtime config renderer and the workload planner consume
//! [`ResolvedFleet`] and never look at the raw spec, so values that appear
//! in both artifacts (media settings, env overrides) come from one place.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::cron::CronExpr;
use crate::error::SpecValidationError;
use crate::name::{validate_identity, validate_slug, BotName};
use crate::quantity::Quantity;
use crate::types::{
    BotSpec, FleetDefaults, FleetSpec, PlatformConfig, ResourceSpec, SecretKeyRef,
};

/// Upper bound on replicas per bot.
pub const MAX_REPLICAS: u32 = 10;

/// Env keys owned by the platform; neither fleet nor bot env can set them.
/// `BOT_MODE`, `TZ` and the HealthGate settings come from `fleet.mode`,
/// `fleet.timezone` and `[fleet.health]`.
pub const RESERVED_ENV_KEYS: &[&str] = &[
    "BOT_ID",
    "BOT_ACCOUNT",
    "BOT_MODE",
    "TZ",
    "POSTGRES_PASSWORD",
    "REDIS_PASSWORD",
    "READY_MARKER",
];

/// Prefix of the HealthGate variables, all reserved.
pub const RESERVED_ENV_PREFIX: &str = "HEALTH_";

pub fn is_reserved_env_key(key: &str) -> bool {
    RESERVED_ENV_KEYS.contains(&key) || key.starts_with(RESERVED_ENV_PREFIX)
}

pub const ENV_VIDEO_DURATION: &str = "VIDEO_DURATION";
pub const ENV_VIDEO_FPS: &str = "VIDEO_FPS";
pub const ENV_VIDEO_WIDTH: &str = "VIDEO_WIDTH";
pub const ENV_VIDEO_HEIGHT: &str = "VIDEO_HEIGHT";
pub const ENV_AUTO_PUBLISH: &str = "AUTO_PUBLISH";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Description used when a platform doesn't set one.
pub const DEFAULT_DESCRIPTION: &str = "Satisfying physics simulation";

/// Hashtags used when a platform doesn't set any.
pub fn default_hashtags(platform: &str) -> Vec<String> {
    let tags: &[&str] = match platform {
        "tiktok" => &["#fyp", "#viral", "#satisfying"],
        "youtube" => &["#shorts", "#satisfying"],
        "instagram" => &["#reels", "#satisfying"],
        _ => &["#satisfying"],
    };
    tags.iter().map(|t| t.to_string()).collect()
}

/// Validated fleet with every default applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFleet {
    pub fleet: ResolvedDefaults,

    /// Enabled bots, in spec order.
    pub bots: Vec<ResolvedBot>,

    pub warnings: Vec<SpecWarning>,
}

impl ResolvedFleet {
    pub fn bot(&self, name: &str) -> Option<&ResolvedBot> {
        self.bots.iter().find(|b| b.name.as_str() == name)
    }
}

/// Fleet defaults after fleet-level validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDefaults {
    pub spec: FleetDefaults,
    pub data_size: Quantity,
    pub media_size: Quantity,
    pub database: Option<DatabaseConnection>,
    pub cache: Option<CacheConnection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConnection {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: SecretKeyRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConnection {
    pub host: String,
    pub port: u16,
    pub password: SecretKeyRef,
}

/// One enabled bot with defaults merged.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBot {
    pub name: BotName,
    pub identity: String,
    pub account: String,
    pub replicas: u32,

    /// Enabled platforms only.
    pub platforms: BTreeMap<String, ResolvedPlatform>,

    pub resources: ResolvedResources,

    /// Fleet env overlaid with bot env. Media keys and `LOG_LEVEL` are
    /// always present and canonically formatted.
    pub env: BTreeMap<String, String>,

    pub secret_env: BTreeMap<String, SecretKeyRef>,

    pub media: MediaSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlatform {
    pub cron: CronExpr,
    pub hashtags: Vec<String>,
    pub description: String,
    pub target_account: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResources {
    pub spec: ResourceSpec,
    pub request_cpu: Quantity,
    pub request_memory: Quantity,
    pub limit_cpu: Quantity,
    pub limit_memory: Quantity,
}

/// Pipeline parameters shared by the config document and the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSettings {
    pub duration_seconds: f64,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub auto_publish: bool,
    pub log_level: String,
}

impl MediaSettings {
    /// Duration as embedded in the runtime config. Whole seconds become
    /// integers.
    pub fn duration_value(&self) -> serde_json::Value {
        let seconds = self.duration_seconds;
        if seconds.fract() == 0.0 && seconds < u64::MAX as f64 {
            serde_json::Value::from(seconds as u64)
        } else {
            serde_json::Value::from(seconds)
        }
    }

    /// Canonical text for `VIDEO_DURATION` (`30`, `45.5`), spelled exactly
    /// as the number in the runtime config.
    pub fn duration_text(&self) -> String {
        self.duration_value().to_string()
    }
}

/// Non-fatal finding reported alongside a successful resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecWarning {
    /// Two platforms of one bot publish to the same target on the same schedule.
    DuplicateSchedule {
        bot: String,
        platforms: (String, String),
        cron: String,
        target: String,
    },
}

impl fmt::Display for SpecWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecWarning::DuplicateSchedule {
                bot,
                platforms,
                cron,
                target,
            } => write!(
                f,
                "bot '{bot}': platforms '{}' and '{}' both publish to '{target}' on schedule '{cron}'",
                platforms.0, platforms.1
            ),
        }
    }
}

/// Validate the spec and merge defaults.
///
/// Fails on the first problem found; nothing is produced for a spec with
/// any invalid enabled bot.
pub fn resolve(spec: &FleetSpec) -> Result<ResolvedFleet, SpecValidationError> {
    let fleet = resolve_defaults(&spec.fleet)?;
    let names = check_names(spec)?;

    let mut bots = Vec::new();
    let mut warnings = Vec::new();
    for (bot, name) in spec.bots.iter().zip(names) {
        if !bot.enabled {
            continue;
        }
        let resolved = resolve_bot(&fleet, bot, name)?;
        warnings.extend(schedule_warnings(&resolved));
        bots.push(resolved);
    }

    Ok(ResolvedFleet {
        fleet,
        bots,
        warnings,
    })
}

fn resolve_defaults(spec: &FleetDefaults) -> Result<ResolvedDefaults, SpecValidationError> {
    validate_slug(&spec.name, 30).map_err(|reason| SpecValidationError::fleet("name", reason))?;
    validate_slug(spec.namespace(), 63)
        .map_err(|reason| SpecValidationError::fleet("namespace", reason))?;

    if spec.image.trim().is_empty() {
        return Err(SpecValidationError::fleet("image", "cannot be empty"));
    }
    if spec.image.contains(char::is_whitespace) {
        return Err(SpecValidationError::fleet("image", "cannot contain whitespace"));
    }

    match spec.image_pull_policy.as_str() {
        "Always" | "IfNotPresent" | "Never" => {}
        other => {
            return Err(SpecValidationError::fleet(
                "image_pull_policy",
                format!("'{other}' is not one of Always, IfNotPresent, Never"),
            ))
        }
    }

    let data_size = Quantity::parse(&spec.storage.data_size)
        .map_err(|e| SpecValidationError::fleet("storage.data_size", e.to_string()))?;
    let media_size = Quantity::parse(&spec.storage.media_size)
        .map_err(|e| SpecValidationError::fleet("storage.media_size", e.to_string()))?;

    let health = &spec.health;
    for (field, value) in [
        ("health.disk_ceiling_percent", health.disk_ceiling_percent),
        (
            "health.memory_soft_ceiling_percent",
            health.memory_soft_ceiling_percent,
        ),
    ] {
        if !(1..=100).contains(&value) {
            return Err(SpecValidationError::fleet(field, "must be between 1 and 100"));
        }
    }
    for (field, value) in [
        ("health.startup_period_seconds", health.startup_period_seconds),
        (
            "health.startup_failure_threshold",
            health.startup_failure_threshold,
        ),
        ("health.liveness_period_seconds", health.liveness_period_seconds),
        (
            "health.liveness_failure_threshold",
            health.liveness_failure_threshold,
        ),
        (
            "health.readiness_period_seconds",
            health.readiness_period_seconds,
        ),
        (
            "health.readiness_failure_threshold",
            health.readiness_failure_threshold,
        ),
    ] {
        if value == 0 {
            return Err(SpecValidationError::fleet(field, "must be at least 1"));
        }
    }
    if health.process_pattern.trim().is_empty() {
        return Err(SpecValidationError::fleet(
            "health.process_pattern",
            "cannot be empty",
        ));
    }

    for key in spec.env.keys() {
        validate_env_key(key).map_err(|reason| SpecValidationError::fleet(format!("env.{key}"), reason))?;
        if is_reserved_env_key(key) {
            return Err(SpecValidationError::fleet(
                format!("env.{key}"),
                "is reserved and cannot be overridden",
            ));
        }
    }

    let fleet_name = spec.name.as_str();
    let db = &spec.infra.database;
    let database = db.enabled.then(|| DatabaseConnection {
        host: db
            .host
            .clone()
            .unwrap_or_else(|| format!("{fleet_name}-postgresql")),
        port: db.port,
        database: db.database.clone().unwrap_or_else(|| fleet_name.to_string()),
        user: db.user.clone().unwrap_or_else(|| fleet_name.to_string()),
        password: db
            .password_secret
            .clone()
            .unwrap_or_else(|| SecretKeyRef::new(format!("{fleet_name}-postgresql"), "password")),
    });

    let cache_spec = &spec.infra.cache;
    let cache = cache_spec.enabled.then(|| CacheConnection {
        host: cache_spec
            .host
            .clone()
            .unwrap_or_else(|| format!("{fleet_name}-redis-master")),
        port: cache_spec.port,
        password: cache_spec
            .password_secret
            .clone()
            .unwrap_or_else(|| SecretKeyRef::new(format!("{fleet_name}-redis"), "redis-password")),
    });

    Ok(ResolvedDefaults {
        spec: spec.clone(),
        data_size,
        media_size,
        database,
        cache,
    })
}

/// Names must be valid and unique, and so must the identities derived from
/// them. Checked for every bot, enabled or not.
fn check_names(spec: &FleetSpec) -> Result<Vec<BotName>, SpecValidationError> {
    let mut seen = HashSet::new();
    let mut by_identity: HashMap<String, &str> = HashMap::new();
    let mut names = Vec::with_capacity(spec.bots.len());

    for bot in &spec.bots {
        let name = BotName::parse(&bot.name)
            .map_err(|reason| SpecValidationError::bot(&bot.name, "name", reason))?;

        if !seen.insert(bot.name.as_str()) {
            return Err(SpecValidationError::DuplicateName(bot.name.clone()));
        }

        let identity = name.identity(&spec.fleet.name);
        validate_identity(&identity)
            .map_err(|reason| SpecValidationError::bot(&bot.name, "identity", reason))?;
        if let Some(first) = by_identity.insert(identity.clone(), bot.name.as_str()) {
            return Err(SpecValidationError::IdentityCollision {
                first: first.to_string(),
                second: bot.name.clone(),
                identity,
            });
        }

        names.push(name);
    }

    Ok(names)
}

fn resolve_bot(
    fleet: &ResolvedDefaults,
    bot: &BotSpec,
    name: BotName,
) -> Result<ResolvedBot, SpecValidationError> {
    let err = |field: &str, reason: String| SpecValidationError::bot(&bot.name, field, reason);

    if bot.account.trim().is_empty() {
        return Err(err("account", "cannot be empty".to_string()));
    }

    if bot.replicas > MAX_REPLICAS {
        return Err(err(
            "replicas",
            format!("{} exceeds the maximum of {MAX_REPLICAS}", bot.replicas),
        ));
    }

    let platforms = resolve_platforms(bot)?;
    if platforms.is_empty() {
        return Err(err(
            "platforms",
            "at least one platform must be enabled".to_string(),
        ));
    }

    let resources = resolve_resources(bot, bot.resources.as_ref().unwrap_or(&fleet.spec.resources))?;

    for key in bot.env.keys().chain(bot.secret_env.keys()) {
        validate_env_key(key).map_err(|reason| err(&format!("env.{key}"), reason))?;
        if is_reserved_env_key(key) {
            return Err(err(
                &format!("env.{key}"),
                "is reserved and cannot be overridden".to_string(),
            ));
        }
    }
    if let Some(key) = bot.secret_env.keys().find(|k| bot.env.contains_key(*k)) {
        return Err(err(
            &format!("secret_env.{key}"),
            "is also set as a literal in env".to_string(),
        ));
    }
    for (key, secret) in &bot.secret_env {
        if secret.name.trim().is_empty() || secret.key.trim().is_empty() {
            return Err(err(
                &format!("secret_env.{key}"),
                "secret name and key cannot be empty".to_string(),
            ));
        }
    }

    let mut env = fleet.spec.env.clone();
    env.extend(bot.env.iter().map(|(k, v)| (k.clone(), v.clone())));

    let media = media_settings(&env).map_err(|(key, reason)| err(&format!("env.{key}"), reason))?;
    env.insert(ENV_VIDEO_DURATION.to_string(), media.duration_text());
    env.insert(ENV_VIDEO_FPS.to_string(), media.fps.to_string());
    env.insert(ENV_VIDEO_WIDTH.to_string(), media.width.to_string());
    env.insert(ENV_VIDEO_HEIGHT.to_string(), media.height.to_string());
    env.insert(ENV_AUTO_PUBLISH.to_string(), media.auto_publish.to_string());
    env.insert(ENV_LOG_LEVEL.to_string(), media.log_level.clone());

    Ok(ResolvedBot {
        identity: name.identity(&fleet.spec.name),
        name,
        account: bot.account.clone(),
        replicas: bot.replicas,
        platforms,
        resources,
        env,
        secret_env: bot.secret_env.clone(),
        media,
    })
}

fn resolve_platforms(
    bot: &BotSpec,
) -> Result<BTreeMap<String, ResolvedPlatform>, SpecValidationError> {
    let mut out = BTreeMap::new();

    for (platform, config) in &bot.platforms {
        let field = |suffix: &str| format!("platforms.{platform}.{suffix}");

        validate_slug(platform, 40)
            .map_err(|reason| SpecValidationError::bot(&bot.name, format!("platforms.{platform}"), reason))?;

        if !config.enabled {
            continue;
        }

        out.insert(
            platform.clone(),
            resolve_platform(bot, platform, config).map_err(|(suffix, reason)| {
                SpecValidationError::bot(&bot.name, field(suffix), reason)
            })?,
        );
    }

    Ok(out)
}

fn resolve_platform(
    bot: &BotSpec,
    platform: &str,
    config: &PlatformConfig,
) -> Result<ResolvedPlatform, (&'static str, String)> {
    let schedule = config
        .schedule
        .as_deref()
        .ok_or(("schedule", "is required for an enabled platform".to_string()))?;
    let cron = CronExpr::parse(schedule).map_err(|e| ("schedule", e.to_string()))?;

    let hashtags = match &config.hashtags {
        Some(tags) if tags.is_empty() => {
            return Err(("hashtags", "cannot be empty when set".to_string()));
        }
        Some(tags) => {
            if tags.iter().any(|t| t.trim().is_empty()) {
                return Err(("hashtags", "cannot contain blank entries".to_string()));
            }
            tags.clone()
        }
        None => default_hashtags(platform),
    };

    let description = config
        .description
        .clone()
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    let target_account = config.account.clone().unwrap_or_else(|| bot.account.clone());

    Ok(ResolvedPlatform {
        cron,
        hashtags,
        description,
        target_account,
    })
}

fn resolve_resources(
    bot: &BotSpec,
    spec: &ResourceSpec,
) -> Result<ResolvedResources, SpecValidationError> {
    let parse = |field: &str, value: &str| {
        Quantity::parse(value)
            .map_err(|e| SpecValidationError::bot(&bot.name, format!("resources.{field}"), e.to_string()))
    };

    let request_cpu = parse("requests.cpu", &spec.requests.cpu)?;
    let request_memory = parse("requests.memory", &spec.requests.memory)?;
    let limit_cpu = parse("limits.cpu", &spec.limits.cpu)?;
    let limit_memory = parse("limits.memory", &spec.limits.memory)?;

    for (field, request, limit) in [
        ("cpu", &request_cpu, &limit_cpu),
        ("memory", &request_memory, &limit_memory),
    ] {
        if request > limit {
            return Err(SpecValidationError::bot(
                &bot.name,
                format!("resources.{field}"),
                format!("request {request} exceeds limit {limit}"),
            ));
        }
    }

    Ok(ResolvedResources {
        spec: spec.clone(),
        request_cpu,
        request_memory,
        limit_cpu,
        limit_memory,
    })
}

fn media_settings(env: &BTreeMap<String, String>) -> Result<MediaSettings, (String, String)> {
    let positive_int = |key: &str, default: u32| -> Result<u32, (String, String)> {
        match env.get(key) {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(v) if v > 0 => Ok(v),
                _ => Err((key.to_string(), format!("'{raw}' is not a positive integer"))),
            },
        }
    };

    let duration_seconds = match env.get(ENV_VIDEO_DURATION) {
        None => 30.0,
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => v,
            _ => {
                return Err((
                    ENV_VIDEO_DURATION.to_string(),
                    format!("'{raw}' is not a positive number"),
                ))
            }
        },
    };

    let auto_publish = match env.get(ENV_AUTO_PUBLISH).map(|v| v.trim().to_ascii_lowercase()) {
        None => true,
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes") => true,
        Some(v) if matches!(v.as_str(), "false" | "0" | "no") => false,
        Some(v) => {
            return Err((
                ENV_AUTO_PUBLISH.to_string(),
                format!("'{v}' is not a boolean"),
            ))
        }
    };

    let log_level = match env.get(ENV_LOG_LEVEL) {
        None => "INFO".to_string(),
        Some(raw) => {
            let upper = raw.trim().to_ascii_uppercase();
            if !LOG_LEVELS.contains(&upper.as_str()) {
                return Err((
                    ENV_LOG_LEVEL.to_string(),
                    format!("'{raw}' is not one of {}", LOG_LEVELS.join(", ")),
                ));
            }
            upper
        }
    };

    Ok(MediaSettings {
        duration_seconds,
        fps: positive_int(ENV_VIDEO_FPS, 60)?,
        width: positive_int(ENV_VIDEO_WIDTH, 1080)?,
        height: positive_int(ENV_VIDEO_HEIGHT, 1920)?,
        auto_publish,
        log_level,
    })
}

fn schedule_warnings(bot: &ResolvedBot) -> Vec<SpecWarning> {
    let entries: Vec<(&String, &ResolvedPlatform)> = bot.platforms.iter().collect();
    let mut warnings = Vec::new();

    for (i, (a_name, a)) in entries.iter().enumerate() {
        for (b_name, b) in &entries[i + 1..] {
            if a.cron == b.cron && a.target_account == b.target_account {
                warnings.push(SpecWarning::DuplicateSchedule {
                    bot: bot.name.to_string(),
                    platforms: (a_name.to_string(), b_name.to_string()),
                    cron: a.cron.to_string(),
                    target: a.target_account.clone(),
                });
            }
        }
    }

    warnings
}

/// Env keys must match `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_env_key(key: &str) -> Result<(), String> {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return Err("key cannot be empty".to_string());
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err("key must start with a letter or underscore".to_string());
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(format!("invalid character '{c}' in key"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(bots: &str) -> FleetSpec {
        let contents = format!(
            r#"
[fleet]
name = "tiksimpro"
image = "ghcr.io/acme/tiksimpro:1.0.0"

[fleet.env]
LOG_LEVEL = "info"
VIDEO_DURATION = "30"

{bots}
"#
        );
        FleetSpec::from_toml_str(&contents).unwrap()
    }

    const BOT1: &str = r#"
[[bots]]
name = "bot1"
account = "@physics"
[bots.platforms.tiktok]
schedule = "0 */6 * * *"
"#;

    #[test]
    fn merges_env_with_bot_precedence() {
        let spec = spec(&format!("{BOT1}\n[bots.env]\nVIDEO_DURATION = \"45.5\"\nEXTRA = \"x\"\n"));
        let fleet = resolve(&spec).unwrap();
        let bot = fleet.bot("bot1").unwrap();

        assert_eq!(bot.env["VIDEO_DURATION"], "45.5");
        assert_eq!(bot.env["EXTRA"], "x");
        assert_eq!(bot.env["LOG_LEVEL"], "INFO");
        assert_eq!(bot.env["VIDEO_FPS"], "60");
        assert_eq!(bot.media.duration_seconds, 45.5);
        assert_eq!(bot.identity, "tiksimpro-bot1");
    }

    #[test]
    fn canonicalises_duration_text() {
        let spec = spec(&format!("{BOT1}\n[bots.env]\nVIDEO_DURATION = \"45.0\"\n"));
        let bot = resolve(&spec).unwrap().bots.remove(0);
        assert_eq!(bot.env["VIDEO_DURATION"], "45");
    }

    #[test]
    fn duration_text_is_the_json_spelling() {
        let bot = resolve(&spec(&format!("{BOT1}\n[bots.env]\nVIDEO_DURATION = \"0.0000001\"\n")))
            .unwrap()
            .bots
            .remove(0);

        let embedded = serde_json::json!({ "duration": bot.media.duration_value() }).to_string();
        assert_eq!(embedded, format!("{{\"duration\":{}}}", bot.env["VIDEO_DURATION"]));
        assert_eq!(bot.media.duration_value(), serde_json::json!(1e-7));

        let whole = MediaSettings {
            duration_seconds: 30.0,
            ..bot.media.clone()
        };
        assert_eq!(whole.duration_value(), serde_json::json!(30));
        assert_eq!(whole.duration_text(), "30");
    }

    #[test]
    fn applies_platform_defaults() {
        let fleet = resolve(&spec(BOT1)).unwrap();
        let tiktok = &fleet.bots[0].platforms["tiktok"];
        assert_eq!(tiktok.hashtags, default_hashtags("tiktok"));
        assert_eq!(tiktok.description, DEFAULT_DESCRIPTION);
        assert_eq!(tiktok.target_account, "@physics");
    }

    #[test]
    fn skips_disabled_bots_and_platforms() {
        let bots = format!(
            "{BOT1}\n[bots.platforms.youtube]\nenabled = false\n\n[[bots]]\nname = \"bot2\"\naccount = \"@b\"\nenabled = false\n"
        );
        let fleet = resolve(&spec(&bots)).unwrap();
        assert_eq!(fleet.bots.len(), 1);
        assert_eq!(
            fleet.bots[0].platforms.keys().collect::<Vec<_>>(),
            vec!["tiktok"]
        );
    }

    #[test]
    fn disabled_bots_still_need_unique_names() {
        let bots = format!("{BOT1}\n[[bots]]\nname = \"bot1\"\naccount = \"@b\"\nenabled = false\n");
        assert_eq!(
            resolve(&spec(&bots)).unwrap_err(),
            SpecValidationError::DuplicateName("bot1".to_string())
        );
    }

    #[test]
    fn rejects_identity_collisions() {
        let bots = r#"
[[bots]]
name = "bot_1"
account = "@a"
[bots.platforms.tiktok]
schedule = "0 * * * *"

[[bots]]
name = "Bot-1"
account = "@b"
[bots.platforms.tiktok]
schedule = "0 * * * *"
"#;
        let err = resolve(&spec(bots)).unwrap_err();
        assert!(matches!(
            err,
            SpecValidationError::IdentityCollision { ref identity, .. } if identity == "tiksimpro-bot-1"
        ));
    }

    #[test]
    fn requires_an_enabled_platform() {
        let bots = "[[bots]]\nname = \"bot1\"\naccount = \"@a\"\n[bots.platforms.tiktok]\nenabled = false\n";
        let err = resolve(&spec(bots)).unwrap_err();
        assert_eq!(err.field(), Some("platforms"));
    }

    #[test]
    fn rejects_malformed_schedule() {
        let bots = BOT1.replace("0 */6 * * *", "0 */6 * *");
        let err = resolve(&spec(&bots)).unwrap_err();
        assert_eq!(err.bot_name(), Some("bot1"));
        assert_eq!(err.field(), Some("platforms.tiktok.schedule"));
    }

    #[test]
    fn rejects_requests_above_limits() {
        let bots = format!(
            "{BOT1}\n[bots.resources]\nrequests = {{ memory = \"3Gi\", cpu = \"250m\" }}\nlimits = {{ memory = \"2Gi\", cpu = \"1\" }}\n"
        );
        let err = resolve(&spec(&bots)).unwrap_err();
        assert_eq!(err.field(), Some("resources.memory"));
    }

    #[test]
    fn rejects_non_positive_overrides() {
        for (key, value) in [
            ("VIDEO_DURATION", "0"),
            ("VIDEO_DURATION", "abc"),
            ("VIDEO_FPS", "-1"),
            ("AUTO_PUBLISH", "maybe"),
        ] {
            let bots = format!("{BOT1}\n[bots.env]\n{key} = \"{value}\"\n");
            let err = resolve(&spec(&bots)).unwrap_err();
            assert_eq!(err.field(), Some(format!("env.{key}").as_str()), "{key}={value}");
        }
    }

    #[test]
    fn rejects_reserved_and_conflicting_env() {
        let bots = format!("{BOT1}\n[bots.env]\nBOT_ID = \"x\"\n");
        assert_eq!(resolve(&spec(&bots)).unwrap_err().field(), Some("env.BOT_ID"));

        let bots = format!(
            "{BOT1}\n[bots.env]\nTOKEN = \"x\"\n[bots.secret_env]\nTOKEN = {{ name = \"s\", key = \"k\" }}\n"
        );
        assert_eq!(
            resolve(&spec(&bots)).unwrap_err().field(),
            Some("secret_env.TOKEN")
        );
    }

    #[test]
    fn platform_owned_env_keys_are_reserved() {
        for key in ["BOT_MODE", "TZ", "READY_MARKER", "HEALTH_PROCESS_PATTERN"] {
            let bots = format!("{BOT1}\n[bots.env]\n{key} = \"x\"\n");
            assert_eq!(
                resolve(&spec(&bots)).unwrap_err().field(),
                Some(format!("env.{key}").as_str()),
                "{key}"
            );

            let mut fleet_level = spec(BOT1);
            fleet_level.fleet.env.insert(key.to_string(), "x".to_string());
            assert!(matches!(
                resolve(&fleet_level),
                Err(SpecValidationError::Fleet { ref field, .. }) if *field == format!("env.{key}")
            ));
        }
        assert!(!is_reserved_env_key("HEALTHY"));
    }

    #[test]
    fn rejects_identity_over_label_limit() {
        let mut spec = spec(&BOT1.replace("name = \"bot1\"", &format!("name = \"{}\"", "b".repeat(40))));
        spec.fleet.name = "f".repeat(30);
        let err = resolve(&spec).unwrap_err();
        assert_eq!(err.field(), Some("identity"));
        assert_eq!(err.bot_name(), Some("b".repeat(40).as_str()));

        spec.fleet.name = "f".repeat(11);
        assert_eq!(resolve(&spec).unwrap().bots[0].identity.len(), 52);
    }

    #[test]
    fn rejects_identity_starting_with_digit() {
        let mut spec = spec(BOT1);
        spec.fleet.name = "7up".to_string();
        let err = resolve(&spec).unwrap_err();
        assert_eq!(err.field(), Some("identity"));
        assert!(err.to_string().contains("7up-bot1"));
    }

    #[test]
    fn rejects_too_many_replicas() {
        let bots = BOT1.replace("account = \"@physics\"", "account = \"@physics\"\nreplicas = 11");
        assert_eq!(resolve(&spec(&bots)).unwrap_err().field(), Some("replicas"));
    }

    #[test]
    fn warns_on_duplicate_schedule_for_same_target() {
        let bots = format!("{BOT1}\n[bots.platforms.youtube]\nschedule = \"0  */6 * * *\"\n");
        let fleet = resolve(&spec(&bots)).unwrap();
        assert_eq!(fleet.warnings.len(), 1);
        assert!(fleet.warnings[0].to_string().contains("'tiktok' and 'youtube'"));
    }

    #[test]
    fn no_warning_when_targets_differ() {
        let bots = format!(
            "{BOT1}\n[bots.platforms.youtube]\nschedule = \"0 */6 * * *\"\naccount = \"@other\"\n"
        );
        assert!(resolve(&spec(&bots)).unwrap().warnings.is_empty());
    }

    #[test]
    fn infra_connections_take_fleet_derived_defaults() {
        let mut spec = spec(BOT1);
        spec.fleet.infra.database.enabled = true;
        spec.fleet.infra.cache.enabled = true;
        let fleet = resolve(&spec).unwrap();

        let db = fleet.fleet.database.unwrap();
        assert_eq!(db.host, "tiksimpro-postgresql");
        assert_eq!(db.password, SecretKeyRef::new("tiksimpro-postgresql", "password"));
        let cache = fleet.fleet.cache.unwrap();
        assert_eq!(cache.host, "tiksimpro-redis-master");
        assert_eq!(cache.port, 6379);
    }

    #[test]
    fn env_key_validation() {
        assert!(validate_env_key("VIDEO_DURATION").is_ok());
        assert!(validate_env_key("_x1").is_ok());
        assert!(validate_env_key("").is_err());
        assert!(validate_env_key("1ABC").is_err());
        assert!(validate_env_key("A-B").is_err());
    }
}
