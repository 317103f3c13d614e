//! Runtime configuration documents.
//!
//! One JSON document per enabled bot, mounted into the worker at
//! [`CONFIG_PATH`]. Every value is resolved here; the worker performs no
//! further templating.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use fleet_reconcile::SpecHash;
use fleet_spec::{BotName, FleetSpec, ResolvedBot, ResolvedFleet, SpecValidationError};

use crate::paths::{CONFIG_PATH, DATA_DIR, LOGS_DIR, MEDIA_DIR};

/// Log line format understood by the worker's logging setup.
pub const LOG_FORMAT: &str = "%(asctime)s - %(name)s - %(levelname)s - %(message)s";

pub const SCHEDULER_CHECK_INTERVAL_SECONDS: u64 = 60;
pub const SCHEDULER_ERROR_BACKOFF_SECONDS: u64 = 300;
pub const SCHEDULER_RUN_TIMEOUT_SECONDS: u64 = 1800;

/// A fully resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RuntimeConfigDocument(Value);

impl RuntimeConfigDocument {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Key-sorted, two-space indented JSON with a trailing newline.
    pub fn to_json(&self) -> String {
        format!("{:#}\n", self.0)
    }

    pub fn checksum(&self) -> SpecHash {
        SpecHash::from_json(&self.0)
    }

    /// Platforms with a publisher entry.
    pub fn publishers(&self) -> Vec<&str> {
        self.0["publishers"]
            .as_object()
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Video duration in seconds.
    pub fn video_duration(&self) -> Option<f64> {
        self.0["pipeline"]["params"]["video_duration"].as_f64()
    }
}

/// Validate the spec and render one document per enabled bot.
pub fn render(
    spec: &FleetSpec,
) -> Result<BTreeMap<BotName, RuntimeConfigDocument>, SpecValidationError> {
    let fleet = fleet_spec::resolve(spec)?;
    Ok(render_resolved(&fleet))
}

/// Render from an already resolved fleet.
pub fn render_resolved(fleet: &ResolvedFleet) -> BTreeMap<BotName, RuntimeConfigDocument> {
    fleet
        .bots
        .iter()
        .map(|bot| (bot.name.clone(), render_bot(fleet, bot)))
        .collect()
}

fn render_bot(fleet: &ResolvedFleet, bot: &ResolvedBot) -> RuntimeConfigDocument {
    let defaults = &fleet.fleet.spec;
    let media = &bot.media;
    let timezone = defaults.timezone.as_str();

    let mut publishers = Map::new();
    let mut jobs = Vec::new();
    for (platform, config) in &bot.platforms {
        let mut params = json!({
            "auto_close": true,
            "account_name": config.target_account,
            "hashtags": config.hashtags,
            "description": config.description,
        });
        if platform == "instagram" {
            params["mobile_emulation"] = json!(true);
        }

        publishers.insert(
            platform.clone(),
            json!({
                "name": publisher_name(platform),
                "enabled": true,
                "params": params,
                "schedule": {
                    "cron": config.cron.to_string(),
                    "description": format!("{platform} publishing for {}", config.target_account),
                    "timezone": timezone,
                },
            }),
        );
        jobs.push(json!({ "platform": platform, "cron": config.cron.to_string() }));
    }

    let duration = media.duration_value();
    let platforms: Vec<&String> = bot.platforms.keys().collect();

    RuntimeConfigDocument(json!({
        "trend_analyzer": {
            "name": "TikTokAnalyzer",
            "params": { "cache_dir": format!("{DATA_DIR}/trends") },
        },
        "video_generator": {
            "name": "CircleSimulator",
            "params": {
                "width": media.width,
                "height": media.height,
                "fps": media.fps,
                "duration": duration,
                "output_path": format!("{MEDIA_DIR}/output.mp4"),
                "temp_dir": format!("{DATA_DIR}/temp"),
                "frames_dir": format!("{DATA_DIR}/frames"),
            },
        },
        "audio_generator": {
            "name": "TrendAudioGenerator",
            "params": { "add_effects": false },
        },
        "media_combiner": {
            "name": "FFmpegMediaCombiner",
            "params": {},
        },
        "video_enhancer": {
            "name": "VideoEnhancer",
            "params": {
                "add_intro": true,
                "add_hashtags": true,
                "add_music": false,
            },
        },
        "publishers": publishers,
        "pipeline": {
            "name": "SimplePipeline",
            "params": {
                "output_dir": MEDIA_DIR,
                "auto_publish": media.auto_publish,
                "video_duration": duration,
                "video_dimensions": [media.width, media.height],
                "fps": media.fps,
                "platforms": platforms,
            },
        },
        "scheduler": {
            "timezone": timezone,
            "check_interval_seconds": SCHEDULER_CHECK_INTERVAL_SECONDS,
            "error_backoff_seconds": SCHEDULER_ERROR_BACKOFF_SECONDS,
            "run_timeout_seconds": SCHEDULER_RUN_TIMEOUT_SECONDS,
            "jobs": jobs,
        },
        "logging": {
            "level": media.log_level,
            "format": LOG_FORMAT,
            "file": format!("{LOGS_DIR}/scheduler.log"),
        },
        "bot": {
            "id": bot.name.as_str(),
            "account": bot.account,
            "mode": defaults.mode,
            "config_path": CONFIG_PATH,
        },
    }))
}

/// Publisher class for a platform.
pub fn publisher_name(platform: &str) -> String {
    match platform {
        "tiktok" => "TikTokPublisher".to_string(),
        "youtube" => "YouTubePublisher".to_string(),
        "instagram" => "InstagramPublisher".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => format!("{}{}Publisher", first.to_ascii_uppercase(), chars.as_str()),
                None => "Publisher".to_string(),
            }
        }
    }
}
