//! Persistence of the recentered reference frame.
//!
//! ```toml
//! [centered_from_world]
//! orientation = [0.0, 0.0, 0.0, 1.0]  # x, y, z, w
//! position = [0.0, 0.0, 0.0]
//! ```

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use tracklink_shared::{Posed, Quatd, Vec3d};

use crate::error::ProfileError;

/// Stored `CenteredFromWorld` transform.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CenteredFrame {
    /// Rotation as `[x, y, z, w]`.
    pub orientation: [f64; 4],
    /// Translation as `[x, y, z]`.
    pub position: [f64; 3],
}

impl Default for CenteredFrame {
    fn default() -> Self {
        Self::from_pose(&Posed::IDENTITY)
    }
}

impl CenteredFrame {
    /// Captures `pose`.
    #[must_use]
    pub fn from_pose(pose: &Posed) -> Self {
        Self {
            orientation: pose.rotation.to_array(),
            position: pose.translation.to_array(),
        }
    }

    /// Transform described by this frame.
    #[must_use]
    pub fn to_pose(&self) -> Posed {
        Posed::new(
            Quatd::from_array(self.orientation),
            Vec3d::from_array(self.position),
        )
    }
}

/// Profile file holding the centered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CenteredFrameProfile {
    /// The stored frame; identity when the key is absent.
    #[serde(default)]
    pub centered_from_world: CenteredFrame,
}

impl CenteredFrameProfile {
    /// Reads `path`. A missing file yields the identity frame.
    ///
    /// # Errors
    ///
    /// I/O failures other than "not found", or malformed TOML.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no centered frame profile, using identity");
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the profile to `path`, replacing any previous contents.
    ///
    /// # Errors
    ///
    /// I/O or encoding failures.
    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_profile_path(tag: &str) -> std::path::PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("tracklink_profile_{tag}_{id}.toml"))
    }

    #[test]
    fn test_missing_profile_is_identity() {
        let path = temp_profile_path("missing");
        let profile = CenteredFrameProfile::load(&path).unwrap();
        assert_eq!(profile.centered_from_world.to_pose(), Posed::IDENTITY);
    }

    #[test]
    fn test_empty_profile_is_identity() {
        let profile: CenteredFrameProfile = toml::from_str("").unwrap();
        assert_eq!(profile.centered_from_world.to_pose(), Posed::IDENTITY);
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_profile_path("saved");
        let pose = Posed::new(Quatd::from_yaw(0.5), Vec3d::new(1.0, -2.0, 0.25));
        let profile = CenteredFrameProfile {
            centered_from_world: CenteredFrame::from_pose(&pose),
        };
        profile.save(&path).unwrap();

        let loaded = CenteredFrameProfile::load(&path).unwrap();
        assert_eq!(loaded.centered_from_world.to_pose(), pose);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_malformed_profile_is_error() {
        let path = temp_profile_path("bad");
        fs::write(&path, "centered_from_world = 3").unwrap();
        assert!(matches!(
            CenteredFrameProfile::load(&path),
            Err(ProfileError::Parse(_))
        ));
        fs::remove_file(&path).ok();
    }
}
