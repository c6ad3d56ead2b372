use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChimeError;

/// One entry of the fixed alarm sound catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SoundId {
    #[default]
    Sound1,
    Sound2,
    Sound3,
    Sound4,
    Sound5,
}

impl SoundId {
    pub const ALL: [SoundId; 5] = [
        SoundId::Sound1,
        SoundId::Sound2,
        SoundId::Sound3,
        SoundId::Sound4,
        SoundId::Sound5,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SoundId::Sound1 => "sound1",
            SoundId::Sound2 => "sound2",
            SoundId::Sound3 => "sound3",
            SoundId::Sound4 => "sound4",
            SoundId::Sound5 => "sound5",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SoundId::Sound1 => "Classic Beep",
            SoundId::Sound2 => "Fun Chime",
            SoundId::Sound3 => "Funky Beat",
            SoundId::Sound4 => "Alert Buzz",
            SoundId::Sound5 => "Gentle Bell",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            SoundId::Sound1 => "beep.mp3",
            SoundId::Sound2 => "chime.mp3",
            SoundId::Sound3 => "music.mp3",
            SoundId::Sound4 => "alert.mp3",
            SoundId::Sound5 => "bell.mp3",
        }
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SoundId {
    type Err = ChimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SoundId::ALL
            .into_iter()
            .find(|id| id.key() == wanted)
            .ok_or_else(|| {
                ChimeError::validation(format!(
                    "unknown sound '{s}' (expected one of sound1..sound5)"
                ))
            })
    }
}

/// Maps catalog entries onto asset files below a sound directory.
#[derive(Debug, Clone)]
pub struct SoundCatalog {
    dir: PathBuf,
}

impl SoundCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn asset_path(&self, id: SoundId) -> PathBuf {
        self.dir.join(id.file_name())
    }
}
