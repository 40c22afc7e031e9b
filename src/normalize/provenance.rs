//! Stage 7: provenance stamping.
//!
//! The harvesting extras are authoritative: whatever the source declared
//! under these keys is overwritten.

use super::{Stage, StageContext};
use crate::models::Dataset;

pub const PROVENANCE_KEYS: &[&str] = &[
    "harvest_object_id",
    "harvest_source_id",
    "harvest_source_title",
    "harvest_source_url",
    "guid",
];

pub struct ProvenanceStage;

impl Stage for ProvenanceStage {
    fn name(&self) -> &'static str {
        "provenance"
    }

    fn apply(&self, mut dataset: Dataset, ctx: &StageContext) -> Dataset {
        dataset.set_extra("harvest_object_id", ctx.harvest_object_id);
        dataset.set_extra("harvest_source_id", &ctx.source.id);
        dataset.set_extra("harvest_source_title", &ctx.source.title);
        dataset.set_extra("harvest_source_url", &ctx.source.url);
        dataset.set_extra("guid", ctx.guid);
        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::StageContext;
    use super::*;

    #[test]
    fn provenance_overrides_source_supplied_extras() {
        let source = source_info();
        let defaults = defaults();
        let ctx = StageContext {
            vocab: empty_resolver(),
            source: &source,
            defaults: &defaults,
            harvest_object_id: "obj-7",
            guid: "guid-7",
        };

        let mut dataset = Dataset::default();
        dataset.set_extra("guid", "spoofed");
        dataset.set_extra("region", "attica");

        let out = ProvenanceStage.apply(dataset, &ctx);
        assert_eq!(out.extra("guid"), Some("guid-7"));
        assert_eq!(out.extra("harvest_object_id"), Some("obj-7"));
        assert_eq!(out.extra("harvest_source_id"), Some("test-source"));
        assert_eq!(out.extra("harvest_source_url"), Some("https://source.example.gr"));
        // Unrelated extras pass through.
        assert_eq!(out.extra("region"), Some("attica"));
    }
}
