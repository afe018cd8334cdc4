//! Offset changes of a repacked archive and the archives they apply to

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// The four external archives referenced by nested archive records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Graphics, `grp.bin`
    Grp = 0,
    /// Data tables, `dat.bin`
    Dat = 1,
    /// Scripts, `scr.bin`
    Scr = 2,
    /// Events, `evt.bin`
    Evt = 3,
}

impl ContainerKind {
    /// Every kind in record order
    pub const ALL: [ContainerKind; 4] = [
        ContainerKind::Grp,
        ContainerKind::Dat,
        ContainerKind::Scr,
        ContainerKind::Evt,
    ];

    /// File name of the archive
    pub fn file_name(self) -> &'static str {
        match self {
            ContainerKind::Grp => "grp.bin",
            ContainerKind::Dat => "dat.bin",
            ContainerKind::Scr => "scr.bin",
            ContainerKind::Evt => "evt.bin",
        }
    }

    /// Value of the kind field in nested archive records
    pub fn record_kind(self) -> i32 {
        self as i32
    }

    /// Kind for a record kind field value
    pub fn from_record_kind(kind: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.record_kind() == kind)
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

impl FromStr for ContainerKind {
    type Err = Error;

    /// Parse an archive file name, ignoring case and any leading directories
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().rsplit(['/', '\\']).next().unwrap_or_default();
        Self::ALL
            .into_iter()
            .find(|k| k.file_name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnsupportedContainerKind(s.trim().to_owned()))
    }
}

/// Original to new offsets of the entries of a repacked archive, in entry order
///
/// The text form starts with the name of the archive it belongs to, followed by one
/// `original,new` line of decimal offsets per entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetRemap {
    target: Option<String>,
    offsets: IndexMap<u32, u32>,
}

impl OffsetRemap {
    /// Create an empty remap without a target name
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name of the archive this remap belongs to
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Name of the archive this remap belongs to
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Record the new offset of an entry
    pub fn insert(&mut self, original: u32, new: u32) {
        self.offsets.insert(original, new);
    }

    /// New offset of the entry originally at `original`
    pub fn get(&self, original: u32) -> Option<u32> {
        self.offsets.get(&original).copied()
    }

    /// Iterate over `(original, new)` pairs in entry order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.offsets.iter().map(|(&k, &v)| (k, v))
    }

    /// Iterate over the entries whose offset changed
    pub fn moved(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.iter().filter(|(original, new)| original != new)
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether no entry is recorded
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Parse the text form
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate();

        let target = match lines.next() {
            Some((_, name)) if !name.trim().is_empty() => name.trim().to_owned(),
            _ => {
                return Err(Error::InvalidRemap {
                    line: 1,
                    reason: "missing archive name".to_owned(),
                })
            }
        };

        let mut remap = Self::new().with_target(target);
        for (number, line) in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let invalid = |reason: String| Error::InvalidRemap {
                line: number + 1,
                reason,
            };

            let (original, new) = line
                .split_once(',')
                .ok_or_else(|| invalid(format!("expected `original,new`, found `{line}`")))?;
            let original: u32 = original
                .trim()
                .parse()
                .map_err(|e| invalid(format!("original offset: {e}")))?;
            let new: u32 = new
                .trim()
                .parse()
                .map_err(|e| invalid(format!("new offset: {e}")))?;

            remap.insert(original, new);
        }

        Ok(remap)
    }
}

impl FromStr for OffsetRemap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OffsetRemap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.target().unwrap_or_default())?;
        for (original, new) in self.iter() {
            writeln!(f, "{original},{new}")?;
        }
        Ok(())
    }
}

impl FromIterator<(u32, u32)> for OffsetRemap {
    fn from_iter<T: IntoIterator<Item = (u32, u32)>>(iter: T) -> Self {
        Self {
            target: None,
            offsets: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::{assert_eq, assert_str_eq};

    use crate::error::{Error, Result};
    use crate::remap::{ContainerKind, OffsetRemap};

    #[test]
    fn container_kinds() -> Result<()> {
        assert_eq!("grp.bin".parse::<ContainerKind>()?, ContainerKind::Grp);
        assert_eq!("data/SCR.BIN".parse::<ContainerKind>()?, ContainerKind::Scr);
        assert_eq!(ContainerKind::from_record_kind(3), Some(ContainerKind::Evt));
        assert_eq!(ContainerKind::from_record_kind(4), None);
        assert_eq!(ContainerKind::Dat.record_kind(), 1);
        assert!(matches!(
            "chr.bin".parse::<ContainerKind>(),
            Err(Error::UnsupportedContainerKind(name)) if name == "chr.bin"
        ));
        Ok(())
    }

    #[test]
    fn parse_remap() -> Result<()> {
        let remap = OffsetRemap::parse("dat.bin\r\n2048,2048\r\n4096,6144\r\n\r\n")?;

        assert_eq!(remap.target(), Some("dat.bin"));
        assert_eq!(remap.len(), 2);
        assert_eq!(remap.get(4096), Some(6144));
        assert_eq!(remap.moved().collect::<Vec<_>>(), vec![(4096, 6144)]);
        Ok(())
    }

    #[test]
    fn write_remap() {
        let remap: OffsetRemap = [(0x1000, 0x2000), (0x800, 0x800)].into_iter().collect();
        let remap = remap.with_target("grp.bin");

        assert_str_eq!(remap.to_string(), "grp.bin\n4096,8192\n2048,2048\n");
    }

    #[test]
    fn invalid_remap() {
        assert!(matches!(
            OffsetRemap::parse(""),
            Err(Error::InvalidRemap { line: 1, .. })
        ));
        assert!(matches!(
            OffsetRemap::parse("grp.bin\n1,2\n3;4"),
            Err(Error::InvalidRemap { line: 3, .. })
        ));
        assert!(matches!(
            OffsetRemap::parse("grp.bin\n1,x"),
            Err(Error::InvalidRemap { line: 2, .. })
        ));
    }
}
