use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SoundType {
    #[default]
    GentleChime,
    SuccessBells,
    NatureBirds,
    SoftPiano,
    MeditationBowl,
    DigitalBeep,
}

impl SoundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoundType::GentleChime => "gentle-chime",
            SoundType::SuccessBells => "success-bells",
            SoundType::NatureBirds => "nature-birds",
            SoundType::SoftPiano => "soft-piano",
            SoundType::MeditationBowl => "meditation-bowl",
            SoundType::DigitalBeep => "digital-beep",
        }
    }
}

/// Side effects fired when a session completes. Failures are reported but
/// never affect the session outcome.
pub trait Celebration: Send + Sync {
    fn play_sound(&self, sound: SoundType) -> Result<()>;
    fn confetti(&self) -> Result<()>;
}

/// Default collaborator for hosts with nothing to render.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCelebration;

impl Celebration for LogCelebration {
    fn play_sound(&self, sound: SoundType) -> Result<()> {
        info!("Completion sound: {}", sound.as_str());
        Ok(())
    }

    fn confetti(&self) -> Result<()> {
        info!("Confetti");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_ids_match_serialized_names() {
        for sound in [
            SoundType::GentleChime,
            SoundType::SuccessBells,
            SoundType::NatureBirds,
            SoundType::SoftPiano,
            SoundType::MeditationBowl,
            SoundType::DigitalBeep,
        ] {
            let value = serde_json::to_value(sound).unwrap();
            assert_eq!(value, sound.as_str());
        }
    }
}
