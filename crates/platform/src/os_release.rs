//! `/etc/os-release` parsing and distribution family mapping.

use std::path::Path;

use crate::error::PlatformError;
use crate::target::LinuxFamily;

/// The fields of an os-release file kiln cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
  pub id: Option<String>,
  pub id_like: Vec<String>,
  pub version_id: Option<String>,
}

impl OsRelease {
  /// Parse os-release content. Unknown keys, comments and malformed lines are ignored.
  pub fn parse(content: &str) -> Self {
    let mut release = OsRelease::default();

    for line in content.lines() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }
      let Some((key, value)) = line.split_once('=') else {
        continue;
      };
      let value = unquote(value.trim());

      match key.trim() {
        "ID" => release.id = Some(value.to_ascii_lowercase()),
        "ID_LIKE" => {
          release.id_like = value.split_whitespace().map(|s| s.to_ascii_lowercase()).collect();
        }
        "VERSION_ID" => release.version_id = Some(value.to_string()),
        _ => {}
      }
    }

    release
  }

  /// Read and parse an os-release file.
  pub fn read(path: &Path) -> Result<Self, PlatformError> {
    let content = std::fs::read_to_string(path).map_err(|source| PlatformError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Self::parse(&content))
  }

  /// The distribution family, from `ID` first and `ID_LIKE` second.
  pub fn family(&self) -> Result<LinuxFamily, PlatformError> {
    map_distro_to_family(self.id.as_deref().unwrap_or_default(), &self.id_like)
  }
}

fn unquote(value: &str) -> &str {
  for quote in ['"', '\''] {
    if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
      return inner;
    }
  }
  value
}

fn family_for_id(id: &str) -> Option<LinuxFamily> {
  let family = match id {
    "debian" | "ubuntu" | "linuxmint" | "pop" | "elementary" | "zorin" | "kali" | "raspbian" => LinuxFamily::Debian,
    "rhel" | "fedora" | "centos" | "rocky" | "almalinux" | "ol" | "amzn" => LinuxFamily::Rhel,
    "arch" | "manjaro" | "endeavouros" => LinuxFamily::Arch,
    "alpine" => LinuxFamily::Alpine,
    "opensuse" | "opensuse-leap" | "opensuse-tumbleweed" | "sles" | "suse" => LinuxFamily::Suse,
    _ => return None,
  };
  Some(family)
}

/// Map a distribution `ID` (and its `ID_LIKE` list) to a family.
///
/// The direct ID wins; otherwise the first `ID_LIKE` entry with a known
/// family is used. A distribution matching neither is an error.
pub fn map_distro_to_family(id: &str, id_like: &[String]) -> Result<LinuxFamily, PlatformError> {
  if let Some(family) = family_for_id(id) {
    return Ok(family);
  }
  id_like
    .iter()
    .find_map(|like| family_for_id(like))
    .ok_or_else(|| PlatformError::UnknownDistro { id: id.to_string() })
}
