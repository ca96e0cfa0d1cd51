//! Keeping tariff values consistent across the classification tree after an edit.
//!
//! Editing a node pushes its value down to every node below it. The node's ancestors are then
//! recalculated as weighted averages: a chapter from its HS4 headings' relative weights, and a
//! section from its chapters' shares.
//!
//! Recalculated ancestors are stored as derived cells. A node without a value of its own inherits
//! from the nearest ancestor, but never a derived value, so repeating an edit gives the same
//! result.
use super::TariffAccessor;
use crate::hierarchy::weights::{
    SectionWeightTable, WeightCache, calculate_chapter_relative_weights, section_chapter_shares,
};
use crate::hierarchy::{HierarchyKey, HsHierarchy};
use crate::id::{ChapterID, CountryCode, SectionID};
use anyhow::{Context, Result};
use log::{debug, warn};

impl TariffAccessor {
    /// The value in effect for `key`.
    ///
    /// Uses the value stored for `key` if there is one. Otherwise the value is inherited from the
    /// nearest ancestor, falling back to source data for the section.
    pub fn effective_value(&mut self, country: &CountryCode, key: &HierarchyKey) -> Option<f64> {
        if let Some(cell) = self.cell(country, key) {
            return Some(cell.value);
        }

        let mut next = key.parent();
        while let Some(current) = next {
            if let Some(value) = self.current.inherited(country, &current) {
                return Some(value);
            }
            next = current.parent();
        }

        let section_key = HierarchyKey::Section(key.section().clone());
        if self.cell(country, &section_key).is_none() {
            return self
                .get_effective_tariff(country, key.section(), None)
                .map(|record| record.us_tariff);
        }

        // The section was derived before it was ever read
        match self.source_tariff(country, key.section()) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Cannot resolve tariff for {key}: {err:#}");
                None
            }
        }
    }

    /// Set `key` and every node below it to `value`.
    ///
    /// Returns the number of descendants updated.
    pub fn push_down(
        &mut self,
        country: &CountryCode,
        key: &HierarchyKey,
        value: f64,
        hierarchy: &HsHierarchy,
    ) -> Result<usize> {
        key.check_exists(hierarchy)?;

        let descendants = key.descendants(hierarchy);
        self.set_tariff(country, key.clone(), value);
        for descendant in &descendants {
            self.set_tariff(country, descendant.clone(), value);
        }

        Ok(descendants.len())
    }

    /// Recalculate the chapter value as the weighted average of its HS4 headings
    fn roll_up_chapter(
        &mut self,
        country: &CountryCode,
        section: &SectionID,
        chapter: &ChapterID,
        hierarchy: &HsHierarchy,
        weight_table: &SectionWeightTable,
        cache: &mut WeightCache,
    ) -> Result<f64> {
        let weights = calculate_chapter_relative_weights(
            section,
            chapter,
            hierarchy,
            country,
            weight_table,
            Some(cache),
        )
        .with_context(|| format!("No weights for chapter {chapter} in section {section}"))?;

        let mut value = 0.0;
        for (hs4, weight) in &weights.hs4_relative_weights {
            let key = HierarchyKey::Hs4(section.clone(), chapter.clone(), hs4.clone());
            let tariff = self
                .effective_value(country, &key)
                .with_context(|| format!("No tariff available for {key}"))?;
            value += weight * tariff;
        }

        self.current.derive(
            country,
            HierarchyKey::Chapter(section.clone(), chapter.clone()),
            value,
        );

        Ok(value)
    }

    /// Recalculate the section value as the share-weighted average of its chapters
    fn roll_up_section(
        &mut self,
        country: &CountryCode,
        section: &SectionID,
        hierarchy: &HsHierarchy,
        weight_table: &SectionWeightTable,
    ) -> Result<f64> {
        let shares = section_chapter_shares(section, hierarchy, country, weight_table)
            .with_context(|| format!("Section {section} not found"))?;

        let mut value = 0.0;
        for (chapter, share) in shares {
            let key = HierarchyKey::Chapter(section.clone(), chapter);
            let tariff = self
                .effective_value(country, &key)
                .with_context(|| format!("No tariff available for {key}"))?;
            value += share * tariff;
        }

        self.current.derive(country, HierarchyKey::Section(section.clone()), value);

        Ok(value)
    }

    /// Recalculate every ancestor of `key` from the values below it
    pub fn roll_up(
        &mut self,
        country: &CountryCode,
        key: &HierarchyKey,
        hierarchy: &HsHierarchy,
        weight_table: &SectionWeightTable,
        cache: &mut WeightCache,
    ) -> Result<()> {
        key.check_exists(hierarchy)?;

        match key {
            HierarchyKey::Section(_) => {
                debug!("{key} has no ancestors to update");
                return Ok(());
            }
            HierarchyKey::Hs4(section, chapter, _) => {
                let value = self.roll_up_chapter(
                    country,
                    section,
                    chapter,
                    hierarchy,
                    weight_table,
                    cache,
                )?;
                debug!("Chapter {section}_{chapter} for {country} is now {value}");
            }
            HierarchyKey::Chapter(..) => {}
        }

        let value = self.roll_up_section(country, key.section(), hierarchy, weight_table)?;
        debug!("Section {} for {country} is now {value}", key.section());

        Ok(())
    }

    /// Apply an edit to `key` and propagate it through the tree
    pub fn apply_edit(
        &mut self,
        country: &CountryCode,
        key: &HierarchyKey,
        value: f64,
        hierarchy: &HsHierarchy,
        weight_table: &SectionWeightTable,
        cache: &mut WeightCache,
    ) -> Result<()> {
        self.push_down(country, key, value, hierarchy)?;
        self.roll_up(country, key, hierarchy, weight_table, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, hierarchy, tariff_accessor, weight_table};
    use crate::tariff::store::CellOrigin;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn key(s: &str) -> HierarchyKey {
        s.parse().unwrap()
    }

    /// Apply a sequence of edits for CAN, returning the chapter 01, chapter 02 and section values
    fn apply_edits(
        tariff_accessor: &mut TariffAccessor,
        hierarchy: &HsHierarchy,
        weight_table: &SectionWeightTable,
        edits: &[(&str, f64)],
    ) -> (f64, f64, f64) {
        let can = CountryCode::new("CAN");
        let mut cache = WeightCache::new();
        for (k, value) in edits {
            tariff_accessor
                .apply_edit(&can, &key(k), *value, hierarchy, weight_table, &mut cache)
                .unwrap();
        }

        let mut value = |k| tariff_accessor.effective_value(&can, &key(k)).unwrap();
        (value("S1_01"), value("S1_02"), value("S1"))
    }

    #[rstest]
    fn test_effective_value_inherits(mut tariff_accessor: TariffAccessor) {
        let can = CountryCode::new("CAN");
        assert_approx_eq!(
            f64,
            tariff_accessor
                .effective_value(&can, &key("S1_02_0201"))
                .unwrap(),
            10.0
        );

        tariff_accessor.set_tariff(&can, key("S1_02"), 4.0);
        assert_approx_eq!(
            f64,
            tariff_accessor
                .effective_value(&can, &key("S1_02_0201"))
                .unwrap(),
            4.0
        );
    }

    #[rstest]
    fn test_push_down(mut tariff_accessor: TariffAccessor, hierarchy: HsHierarchy) {
        let can = CountryCode::new("CAN");
        let count = tariff_accessor
            .push_down(&can, &key("S1_01"), 20.0, &hierarchy)
            .unwrap();
        assert_eq!(count, 3);
        for k in ["S1_01", "S1_01_0101", "S1_01_0102", "S1_01_0103"] {
            assert!(tariff_accessor.is_overridden(&can, &key(k)));
            assert_approx_eq!(f64, tariff_accessor.cell(&can, &key(k)).unwrap().value, 20.0);
        }
        assert!(tariff_accessor.cell(&can, &key("S1_02")).is_none());
    }

    #[rstest]
    fn test_push_down_unknown_key(mut tariff_accessor: TariffAccessor, hierarchy: HsHierarchy) {
        assert_error!(
            tariff_accessor.push_down(&"CAN".into(), &key("S1_07"), 1.0, &hierarchy),
            "S1_07 not found in classification hierarchy"
        );
    }

    #[rstest]
    fn test_apply_edit_hs4(
        mut tariff_accessor: TariffAccessor,
        hierarchy: HsHierarchy,
        weight_table: SectionWeightTable,
    ) {
        let can = CountryCode::new("CAN");
        let mut cache = WeightCache::new();
        tariff_accessor
            .apply_edit(
                &can,
                &key("S1_02_0202"),
                30.0,
                &hierarchy,
                &weight_table,
                &mut cache,
            )
            .unwrap();

        // Chapter 02 = 0.25 * 10 + 0.75 * 30
        assert_approx_eq!(
            f64,
            tariff_accessor.cell(&can, &key("S1_02")).unwrap().value,
            25.0
        );
        // Section = 0.6 * 10 + 0.4 * 25
        let section = tariff_accessor.cell(&can, &key("S1")).unwrap();
        assert_approx_eq!(f64, section.value, 16.0);
        assert_eq!(section.origin, CellOrigin::Derived);
        assert!(!tariff_accessor.is_overridden(&can, &key("S1")));
        assert_eq!(cache.len(), 1);
    }

    #[rstest]
    fn test_apply_edit_section(
        mut tariff_accessor: TariffAccessor,
        hierarchy: HsHierarchy,
        weight_table: SectionWeightTable,
    ) {
        let can = CountryCode::new("CAN");
        let mut cache = WeightCache::new();
        tariff_accessor
            .apply_edit(&can, &key("S2"), 2.0, &hierarchy, &weight_table, &mut cache)
            .unwrap();

        for k in ["S2", "S2_03", "S2_03_0301"] {
            assert_approx_eq!(f64, tariff_accessor.cell(&can, &key(k)).unwrap().value, 2.0);
        }
        assert!(cache.is_empty());
    }

    #[rstest]
    fn test_apply_edit_chapter(
        mut tariff_accessor: TariffAccessor,
        hierarchy: HsHierarchy,
        weight_table: SectionWeightTable,
    ) {
        let can = CountryCode::new("CAN");
        let mut cache = WeightCache::new();
        tariff_accessor
            .apply_edit(&can, &key("S1_01"), 0.0, &hierarchy, &weight_table, &mut cache)
            .unwrap();

        // Section = 0.6 * 0 + 0.4 * 10
        assert_approx_eq!(
            f64,
            tariff_accessor.cell(&can, &key("S1")).unwrap().value,
            4.0
        );
    }

    #[rstest]
    #[case(&[("S1_02_0202", 30.0)], (10.0, 25.0, 16.0))]
    #[case(&[("S1_02_0202", 30.0), ("S1_02_0202", 30.0), ("S1_02_0202", 30.0)], (10.0, 25.0, 16.0))]
    #[case(&[("S1_02_0202", 30.0), ("S1_02_0202", 10.0)], (10.0, 10.0, 10.0))]
    #[case(&[("S1_02_0202", 30.0), ("S1_01_0101", 20.0)], (20.0, 25.0, 22.0))]
    #[case(&[("S1_01_0101", 20.0), ("S1_02_0202", 30.0)], (20.0, 25.0, 22.0))]
    #[case(&[("S1_01", 0.0), ("S1_02_0202", 30.0)], (0.0, 25.0, 10.0))]
    fn test_apply_edit_sequence(
        mut tariff_accessor: TariffAccessor,
        hierarchy: HsHierarchy,
        weight_table: SectionWeightTable,
        #[case] edits: &[(&str, f64)],
        #[case] expected: (f64, f64, f64),
    ) {
        // Chapter 01 only has weight on 0101; chapter 02 splits 0.25/0.75 between 0201 and 0202
        let (chapter_01, chapter_02, section) =
            apply_edits(&mut tariff_accessor, &hierarchy, &weight_table, edits);
        assert_approx_eq!(f64, chapter_01, expected.0);
        assert_approx_eq!(f64, chapter_02, expected.1);
        assert_approx_eq!(f64, section, expected.2);
    }

    #[rstest]
    fn test_unedited_heading_keeps_source_value(
        mut tariff_accessor: TariffAccessor,
        hierarchy: HsHierarchy,
        weight_table: SectionWeightTable,
    ) {
        let can = CountryCode::new("CAN");
        apply_edits(
            &mut tariff_accessor,
            &hierarchy,
            &weight_table,
            &[("S1_02_0202", 30.0), ("S1_02_0202", 30.0)],
        );

        // Headings inherit the section's value from before it was recalculated
        for k in ["S1_01_0101", "S1_02_0201"] {
            assert_approx_eq!(
                f64,
                tariff_accessor.effective_value(&can, &key(k)).unwrap(),
                10.0
            );
        }
        assert_eq!(
            tariff_accessor.cell(&can, &key("S1_02")).unwrap().origin,
            CellOrigin::Derived
        );
    }
}
