//! Stage 6: access-rights and legislation defaulting.
//!
//! Records without an access-rights statement are treated as PUBLIC, and
//! PUBLIC records without declared legislation get the configured
//! open-data legislation URI.

use super::{Stage, StageContext};
use crate::models::Dataset;
use crate::vocab::PUBLIC_ACCESS_RIGHT;

pub struct AccessStage;

impl Stage for AccessStage {
    fn name(&self) -> &'static str {
        "access"
    }

    fn apply(&self, mut dataset: Dataset, ctx: &StageContext) -> Dataset {
        if dataset.access_rights.is_none() {
            dataset.access_rights = Some(PUBLIC_ACCESS_RIGHT.to_string());
        }

        if dataset.access_rights.as_deref() == Some(PUBLIC_ACCESS_RIGHT)
            && dataset.applicable_legislation.is_empty()
            && !ctx.defaults.open_data_legislation.is_empty()
        {
            dataset
                .applicable_legislation
                .push(ctx.defaults.open_data_legislation.clone());
        }

        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::StageContext;
    use super::*;

    fn run(dataset: Dataset) -> Dataset {
        let source = source_info();
        let defaults = defaults();
        let ctx = StageContext {
            vocab: empty_resolver(),
            source: &source,
            defaults: &defaults,
            harvest_object_id: "obj",
            guid: "guid",
        };
        AccessStage.apply(dataset, &ctx)
    }

    #[test]
    fn missing_access_rights_defaults_to_public_with_legislation() {
        let out = run(Dataset::default());
        assert_eq!(out.access_rights.as_deref(), Some(PUBLIC_ACCESS_RIGHT));
        assert_eq!(
            out.applicable_legislation,
            vec!["http://data.europa.eu/eli/dir/2019/1024/oj"]
        );
    }

    #[test]
    fn non_public_records_get_no_legislation() {
        let dataset = Dataset {
            access_rights: Some(
                "http://publications.europa.eu/resource/authority/access-right/RESTRICTED"
                    .to_string(),
            ),
            ..Default::default()
        };
        let out = run(dataset);
        assert!(out.applicable_legislation.is_empty());
    }

    #[test]
    fn declared_legislation_is_untouched() {
        let dataset = Dataset {
            applicable_legislation: vec!["http://data.europa.eu/eli/reg_impl/2023/138/oj".to_string()],
            ..Default::default()
        };
        let out = run(dataset);
        assert_eq!(out.applicable_legislation.len(), 1);
        assert_eq!(
            out.applicable_legislation[0],
            "http://data.europa.eu/eli/reg_impl/2023/138/oj"
        );
    }
}
