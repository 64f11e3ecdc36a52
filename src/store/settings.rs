//! INI settings file holding the username, the first run flag, the last used
//! location and the list of gateways.

use crate::{store::ConfigStore, types::Endpoints};
use anyhow::{Context, Result, ensure};
use ini::Ini;
use log::{debug, info};
use std::{
    fs::File,
    path::{Path, PathBuf},
};

pub const DEFAULT_USERNAME_PLACEHOLDER: &str = "username_not_set";

pub const DEFAULT_LOCATIONS: [(&str, &str); 6] = [
    ("viola", "https://sw-prviola.unipi.it:444"),
    ("blu", "https://sw-prblu.unipi.it:444"),
    ("verde", "https://sw-prverde.unipi.it:444"),
    ("giallo", "https://sw-prgiallo.unipi.it:444"),
    ("arancio", "https://sw-prarancio.unipi.it:444"),
    ("rosso", "https://sw-prrosso.unipi.it:444"),
];

const GENERAL_SECTION: &str = "GeneralSettings";
const LOCATIONS_SECTION: &str = "Locations";
const USERNAME_KEY: &str = "Username";
const HAS_FIRST_RUN_KEY: &str = "HasFirstRun";
const LAST_LOCATION_KEY: &str = "LastConnectedLocation";

/// Settings stored in `config.ini`
///
/// Nothing is cached: reads load the file, writes load, modify and replace it
/// atomically.
#[derive(Debug)]
pub struct IniConfigStore {
    path: PathBuf,
    first_run: bool,
}

impl IniConfigStore {
    /// Open the settings file, creating it or filling in missing entries
    ///
    /// # Arguments
    /// * `path` - Location of the settings file
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let exists = path
            .try_exists()
            .context(format!("failed to check if config file exists: {path:?}"))?;

        let mut ini = if exists {
            Ini::load_from_file(&path).context(format!("failed to read config file: {path:?}"))?
        } else {
            info!("creating default config file at {path:?}");
            Ini::new()
        };

        if Self::apply_defaults(&mut ini) || !exists {
            Self::write_atomically(&ini, &path)?;
        }

        let first_run = ini
            .get_from(Some(GENERAL_SECTION), HAS_FIRST_RUN_KEY)
            .and_then(parse_bool)
            .unwrap_or(true)
            || ini.get_from(Some(GENERAL_SECTION), USERNAME_KEY)
                == Some(DEFAULT_USERNAME_PLACEHOLDER);

        Ok(Self { path, first_run })
    }

    /// Whether setup was never completed, as of opening the file
    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    /// The configured username, `None` while it is still the placeholder
    pub fn username(&self) -> Result<Option<String>> {
        let ini = self.load()?;

        Ok(ini
            .get_from(Some(GENERAL_SECTION), USERNAME_KEY)
            .filter(|name| !name.is_empty() && *name != DEFAULT_USERNAME_PLACEHOLDER)
            .map(str::to_string))
    }

    pub fn set_username(&self, username: &str) -> Result<()> {
        ensure!(
            !username.is_empty() && username != DEFAULT_USERNAME_PLACEHOLDER,
            "failed to store username: invalid username"
        );

        self.update(|ini| {
            ini.with_section(Some(GENERAL_SECTION))
                .set(USERNAME_KEY, username);
        })?;
        info!("username stored in config");
        Ok(())
    }

    /// Reset the username to the placeholder
    pub fn clear_username(&self) -> Result<()> {
        self.update(|ini| {
            ini.with_section(Some(GENERAL_SECTION))
                .set(USERNAME_KEY, DEFAULT_USERNAME_PLACEHOLDER);
        })
    }

    pub fn mark_first_run_completed(&self) -> Result<()> {
        self.update(|ini| {
            ini.with_section(Some(GENERAL_SECTION))
                .set(HAS_FIRST_RUN_KEY, "false");
        })?;
        info!("first run marked as completed");
        Ok(())
    }

    /// Fill in missing sections and keys
    ///
    /// # Returns
    /// true if anything was added
    fn apply_defaults(ini: &mut Ini) -> bool {
        let mut changed = false;

        let general = ini.section(Some(GENERAL_SECTION));
        let missing: Vec<(&str, &str)> = [
            (USERNAME_KEY, DEFAULT_USERNAME_PLACEHOLDER),
            (HAS_FIRST_RUN_KEY, "true"),
            (LAST_LOCATION_KEY, ""),
        ]
        .into_iter()
        .filter(|(key, _)| !general.is_some_and(|section| section.contains_key(key)))
        .collect();

        for (key, value) in missing {
            debug!("adding missing config entry {GENERAL_SECTION}.{key}");
            ini.with_section(Some(GENERAL_SECTION)).set(key, value);
            changed = true;
        }

        if ini.section(Some(LOCATIONS_SECTION)).is_none() {
            debug!("adding default locations");
            let mut locations = ini.with_section(Some(LOCATIONS_SECTION));
            for (name, url) in DEFAULT_LOCATIONS {
                locations.set(name, url);
            }
            changed = true;
        }

        changed
    }

    fn load(&self) -> Result<Ini> {
        Ini::load_from_file(&self.path)
            .context(format!("failed to read config file: {:?}", self.path))
    }

    fn update(&self, apply: impl FnOnce(&mut Ini)) -> Result<()> {
        let mut ini = self.load()?;
        apply(&mut ini);
        Self::write_atomically(&ini, &self.path)
    }

    /// Replace the config file through a synced temp file and a rename
    fn write_atomically(ini: &Ini, path: &Path) -> Result<()> {
        let temp_file_path = path.with_extension("tmp");

        let mut file =
            File::create(&temp_file_path).context("failed to create temp config file")?;
        ini.write_to(&mut file)
            .context("failed to write temp config file")?;
        file.sync_all().context("failed to sync temp config file")?;

        std::fs::rename(&temp_file_path, path).context("failed to replace config file")?;

        debug!("config saved to {path:?}");
        Ok(())
    }
}

impl ConfigStore for IniConfigStore {
    fn endpoints(&self) -> Result<Endpoints> {
        let ini = self.load()?;

        Ok(ini
            .section(Some(LOCATIONS_SECTION))
            .map(|section| section.iter().collect())
            .unwrap_or_default())
    }

    fn last_endpoint(&self) -> Result<Option<String>> {
        let ini = self.load()?;

        Ok(ini
            .get_from(Some(GENERAL_SECTION), LAST_LOCATION_KEY)
            .filter(|name| !name.is_empty())
            .map(str::to_string))
    }

    fn set_last_endpoint(&self, name: Option<&str>) -> Result<()> {
        let value = name.unwrap_or_default();

        self.update(|ini| {
            ini.with_section(Some(GENERAL_SECTION))
                .set(LAST_LOCATION_KEY, value);
        })?;
        info!("last connected location updated to: {value:?}");
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}
