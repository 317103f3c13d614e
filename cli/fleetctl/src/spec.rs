//! Loading the fleet spec and preparing releases from it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;

use fleet_render::{build_releases, fleet_checksum, BotRelease};
use fleet_spec::{BotName, FleetSpec, ResolvedFleet};

use crate::error::FleetError;

/// A validated fleet with every bot's release built.
#[derive(Debug)]
pub struct Prepared {
    pub spec: FleetSpec,
    pub fleet: ResolvedFleet,
    pub releases: BTreeMap<BotName, BotRelease>,
}

impl Prepared {
    /// Resolve the spec and build releases. Fails before any output when
    /// any bot is invalid.
    pub fn new(spec: FleetSpec) -> Result<Self> {
        let fleet = fleet_spec::resolve(&spec).map_err(FleetError::from)?;
        let releases = build_releases(&fleet).context("Failed to render fleet artifacts")?;
        Ok(Self {
            spec,
            fleet,
            releases,
        })
    }

    pub fn namespace(&self) -> &str {
        self.spec.fleet.namespace()
    }

    pub fn fleet_name(&self) -> &str {
        &self.spec.fleet.name
    }

    /// The release of one enabled bot.
    pub fn release(&self, bot: &str) -> Result<&BotRelease, FleetError> {
        if let Some((_, release)) = self.releases.iter().find(|(name, _)| name.as_str() == bot) {
            return Ok(release);
        }

        match self.spec.bot(bot) {
            Some(_) => Err(FleetError::Operational(format!(
                "bot '{bot}' is disabled in the fleet spec"
            ))),
            None => {
                let known: Vec<&str> = self.releases.keys().map(BotName::as_str).collect();
                Err(FleetError::Operational(format!(
                    "bot '{bot}' not found (enabled bots: {})",
                    known.join(", ")
                )))
            }
        }
    }

    /// One bot, or every enabled bot.
    pub fn select(&self, bot: Option<&str>) -> Result<Vec<&BotRelease>, FleetError> {
        match bot {
            Some(bot) => Ok(vec![self.release(bot)?]),
            None => Ok(self.releases.values().collect()),
        }
    }
}

/// Read and parse a fleet spec file.
pub fn load(path: &Path) -> Result<FleetSpec> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read fleet spec from {:?}", path))?;
    Ok(FleetSpec::from_toml_str(&contents).map_err(FleetError::from)?)
}

/// Replace the tag (and any digest) of an image reference.
pub fn image_with_tag(image: &str, tag: &str) -> Result<String, FleetError> {
    let valid = !tag.is_empty()
        && tag.len() <= 128
        && !tag.starts_with(['.', '-'])
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(FleetError::Operational(format!("invalid image tag '{tag}'")));
    }

    let repository = image.split('@').next().unwrap_or(image);
    let name_start = repository.rfind('/').map_or(0, |i| i + 1);
    let repository = match repository[name_start..].find(':') {
        Some(i) => &repository[..name_start + i],
        None => repository,
    };
    Ok(format!("{repository}:{tag}"))
}

/// Write rendered artifacts under `dir`.
///
/// `<bot>/config.json` and `<bot>/workload.yaml` per bot, plus
/// `checksums.json`. Returns the files written.
pub fn write_artifacts(dir: &Path, prepared: &Prepared) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut bots = serde_json::Map::new();

    for (name, release) in &prepared.releases {
        let bot_dir = dir.join(name.as_str());
        fs::create_dir_all(&bot_dir)
            .with_context(|| format!("Failed to create {:?}", bot_dir))?;

        for (file, contents) in [
            ("config.json", release.config.to_json()),
            ("workload.yaml", release.release.manifest.clone()),
        ] {
            let path = bot_dir.join(file);
            fs::write(&path, contents).with_context(|| format!("Failed to write {:?}", path))?;
            written.push(path);
        }

        bots.insert(
            name.to_string(),
            json!({
                "identity": release.release.identity,
                "config_map": release.config_map_name(),
                "config": release.config_checksum,
                "release": release.release.checksum,
            }),
        );
    }

    let checksums = json!({
        "fleet": fleet_checksum(&prepared.releases),
        "bots": bots,
    });
    let path = dir.join("checksums.json");
    fs::write(&path, format!("{:#}\n", checksums))
        .with_context(|| format!("Failed to write {:?}", path))?;
    written.push(path);

    Ok(written)
}
