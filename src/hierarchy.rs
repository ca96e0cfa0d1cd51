//! The section → chapter → HS4 classification tree.
//!
//! Tariff edits and weight annotations address nodes of this tree with a [`HierarchyKey`].
use crate::id::{ChapterID, Hs4Code, SectionID};
use anyhow::{Result, bail, ensure};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub mod weights;

/// Separates the parts of a composite [`HierarchyKey`]
pub const KEY_SEPARATOR: char = '_';

/// An HS4 heading
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Subcategory {
    /// Short name, if provided
    #[serde(default)]
    pub name: Option<String>,
    /// Longer description, if provided
    #[serde(default)]
    pub description: Option<String>,
}

impl Subcategory {
    /// The name to show for this heading, falling back to its description
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.description.as_deref())
    }
}

/// An HS chapter and the HS4 headings within it
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Chapter {
    /// Display name, if provided
    #[serde(default)]
    pub name: Option<String>,
    /// HS4 headings, in source order
    #[serde(default)]
    pub subcategories: IndexMap<Hs4Code, Subcategory>,
}

/// A section and the chapters within it
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Section {
    /// Display name, if provided
    #[serde(default)]
    pub name: Option<String>,
    /// Chapters, in source order
    #[serde(default)]
    pub chapters: IndexMap<ChapterID, Chapter>,
}

/// The whole classification tree, keyed by section ID
pub type HsHierarchy = IndexMap<SectionID, Section>;

/// Look up a chapter in the tree
pub fn get_chapter<'a>(
    hierarchy: &'a HsHierarchy,
    section: &SectionID,
    chapter: &ChapterID,
) -> Option<&'a Chapter> {
    hierarchy.get(section)?.chapters.get(chapter)
}

/// Addresses a node in the classification tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HierarchyKey {
    /// A whole section
    Section(SectionID),
    /// A chapter within a section
    Chapter(SectionID, ChapterID),
    /// An HS4 heading within a chapter
    Hs4(SectionID, ChapterID, Hs4Code),
}

impl HierarchyKey {
    /// The section this key falls under
    pub fn section(&self) -> &SectionID {
        match self {
            Self::Section(section) | Self::Chapter(section, _) | Self::Hs4(section, _, _) => {
                section
            }
        }
    }

    /// The key one level up, if any
    pub fn parent(&self) -> Option<HierarchyKey> {
        match self {
            Self::Section(_) => None,
            Self::Chapter(section, _) => Some(Self::Section(section.clone())),
            Self::Hs4(section, chapter, _) => Some(Self::Chapter(section.clone(), chapter.clone())),
        }
    }

    /// Check that the node this key addresses exists in `hierarchy`
    pub fn check_exists(&self, hierarchy: &HsHierarchy) -> Result<()> {
        let exists = match self {
            Self::Section(section) => hierarchy.contains_key(section),
            Self::Chapter(section, chapter) => get_chapter(hierarchy, section, chapter).is_some(),
            Self::Hs4(section, chapter, hs4) => get_chapter(hierarchy, section, chapter)
                .is_some_and(|chapter| chapter.subcategories.contains_key(hs4)),
        };
        ensure!(exists, "{self} not found in classification hierarchy");

        Ok(())
    }

    /// Every key below this one in `hierarchy`, parents before children
    pub fn descendants(&self, hierarchy: &HsHierarchy) -> Vec<HierarchyKey> {
        let chapter_keys = |section: &SectionID, chapter_id: &ChapterID, chapter: &Chapter| {
            chapter
                .subcategories
                .keys()
                .map(|hs4| Self::Hs4(section.clone(), chapter_id.clone(), hs4.clone()))
                .collect::<Vec<_>>()
        };

        match self {
            Self::Section(section) => {
                let Some(node) = hierarchy.get(section) else {
                    return Vec::new();
                };
                let mut keys = Vec::new();
                for (chapter_id, chapter) in &node.chapters {
                    keys.push(Self::Chapter(section.clone(), chapter_id.clone()));
                    keys.extend(chapter_keys(section, chapter_id, chapter));
                }
                keys
            }
            Self::Chapter(section, chapter_id) => get_chapter(hierarchy, section, chapter_id)
                .map(|chapter| chapter_keys(section, chapter_id, chapter))
                .unwrap_or_default(),
            Self::Hs4(..) => Vec::new(),
        }
    }
}

impl fmt::Display for HierarchyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Section(section) => write!(f, "{section}"),
            Self::Chapter(section, chapter) => write!(f, "{section}{KEY_SEPARATOR}{chapter}"),
            Self::Hs4(section, chapter, hs4) => {
                write!(f, "{section}{KEY_SEPARATOR}{chapter}{KEY_SEPARATOR}{hs4}")
            }
        }
    }
}

impl FromStr for HierarchyKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(KEY_SEPARATOR).collect();
        if parts.iter().any(|part| part.trim().is_empty()) {
            bail!("Invalid hierarchy key '{s}': empty component");
        }

        match parts.as_slice() {
            [section] => Ok(Self::Section((*section).into())),
            [section, chapter] => Ok(Self::Chapter((*section).into(), (*chapter).into())),
            [section, chapter, hs4] => Ok(Self::Hs4(
                (*section).into(),
                (*chapter).into(),
                (*hs4).into(),
            )),
            _ => bail!("Invalid hierarchy key '{s}': too many components"),
        }
    }
}

impl From<SectionID> for HierarchyKey {
    fn from(value: SectionID) -> Self {
        Self::Section(value)
    }
}

impl Serialize for HierarchyKey {
    fn serialize<S>(&self, serialiser: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialiser.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, hierarchy};
    use rstest::rstest;

    #[rstest]
    #[case("S1", HierarchyKey::Section("S1".into()))]
    #[case("S1_01", HierarchyKey::Chapter("S1".into(), "01".into()))]
    #[case("S1_01_0101", HierarchyKey::Hs4("S1".into(), "01".into(), "0101".into()))]
    fn test_hierarchy_key_parse(#[case] s: &str, #[case] expected: HierarchyKey) {
        let key: HierarchyKey = s.parse().unwrap();
        assert_eq!(key, expected);
        assert_eq!(key.to_string(), s);
    }

    #[rstest]
    #[case("", "Invalid hierarchy key '': empty component")]
    #[case("S1__0101", "Invalid hierarchy key 'S1__0101': empty component")]
    #[case("a_b_c_d", "Invalid hierarchy key 'a_b_c_d': too many components")]
    fn test_hierarchy_key_parse_bad(#[case] s: &str, #[case] msg: &str) {
        assert_error!(s.parse::<HierarchyKey>(), msg);
    }

    #[test]
    fn test_hierarchy_key_parent() {
        let key: HierarchyKey = "S1_01_0101".parse().unwrap();
        let chapter = key.parent().unwrap();
        assert_eq!(chapter, HierarchyKey::Chapter("S1".into(), "01".into()));
        assert_eq!(chapter.parent().unwrap(), HierarchyKey::Section("S1".into()));
        assert!(HierarchyKey::Section("S1".into()).parent().is_none());
        assert_eq!(key.section(), &SectionID::new("S1"));
    }

    #[rstest]
    fn test_check_exists(hierarchy: HsHierarchy) {
        assert!("S1_01_0101".parse::<HierarchyKey>().unwrap().check_exists(&hierarchy).is_ok());
        assert_error!(
            "S1_09".parse::<HierarchyKey>().unwrap().check_exists(&hierarchy),
            "S1_09 not found in classification hierarchy"
        );
    }

    #[rstest]
    fn test_descendants(hierarchy: HsHierarchy) {
        let keys: Vec<String> = HierarchyKey::Section("S1".into())
            .descendants(&hierarchy)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            keys,
            [
                "S1_01",
                "S1_01_0101",
                "S1_01_0102",
                "S1_01_0103",
                "S1_02",
                "S1_02_0201",
                "S1_02_0202"
            ]
        );

        let keys = HierarchyKey::Chapter("S1".into(), "02".into()).descendants(&hierarchy);
        assert_eq!(keys.len(), 2);
        assert!(
            HierarchyKey::Hs4("S1".into(), "02".into(), "0201".into())
                .descendants(&hierarchy)
                .is_empty()
        );
    }

    #[test]
    fn test_deserialise_hierarchy() {
        let hierarchy: HsHierarchy = serde_json::from_str(
            r#"{"S1": {"name": "Animals", "chapters": {"01": {"subcategories":
                {"0101": {"description": "Horses"}, "0102": {},
                 "0103": {"name": "Swine", "description": "Live swine"}}}}}}"#,
        )
        .unwrap();
        let chapter = get_chapter(&hierarchy, &"S1".into(), &"01".into()).unwrap();
        assert_eq!(chapter.subcategories.len(), 3);
        assert_eq!(chapter.subcategories[0].display_name(), Some("Horses"));
        assert_eq!(chapter.subcategories[1].display_name(), None);

        // A heading may carry both a name and a description
        let swine = &chapter.subcategories[2];
        assert_eq!(swine.display_name(), Some("Swine"));
        assert_eq!(swine.description.as_deref(), Some("Live swine"));
    }
}
