//! Ranked and segmented views over a harvest batch.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{HarvestBatch, HarvestItem, Sentiment};

pub const LIKE_WEIGHT: f64 = 0.7;
pub const REPLY_WEIGHT: f64 = 0.3;

/// Items listed per keyword segment.
const SEGMENT_TOP_ITEMS: usize = 10;

/// Weighted log engagement: `0.7·ln(likes+1) + 0.3·ln(replies+1)`.
pub fn engagement_score(likes: u64, replies: u64) -> f64 {
    LIKE_WEIGHT * (likes as f64 + 1.0).ln() + REPLY_WEIGHT * (replies as f64 + 1.0).ln()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub like_component: f64,
    pub reply_component: f64,
}

/// A top-level item with its score and best collected replies.
#[derive(Debug, Clone, Serialize)]
pub struct TopComment {
    pub item: HarvestItem,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub replies: Vec<HarvestItem>,
}

/// Top `n` top-level items by engagement score, each with up to
/// `replies_per_comment` of its collected replies.
pub fn top_comments(batch: &HarvestBatch, n: usize, replies_per_comment: usize) -> Vec<TopComment> {
    let mut replies_by_thread: BTreeMap<&str, Vec<&HarvestItem>> = BTreeMap::new();
    for reply in batch.items().filter(|i| i.is_reply) {
        if let Some(thread) = reply.parent_thread_id.as_deref() {
            replies_by_thread.entry(thread).or_default().push(reply);
        }
    }

    let mut ranked: Vec<TopComment> = batch
        .items()
        .filter(|i| !i.is_reply)
        .map(|item| {
            let breakdown = ScoreBreakdown {
                like_component: LIKE_WEIGHT * (item.like_count as f64 + 1.0).ln(),
                reply_component: REPLY_WEIGHT * (item.reply_count as f64 + 1.0).ln(),
            };
            let mut replies: Vec<HarvestItem> = replies_by_thread
                .get(item.item_id.as_str())
                .map(|r| r.iter().map(|&reply| reply.clone()).collect())
                .unwrap_or_default();
            replies.sort_by(|a, b| b.like_count.cmp(&a.like_count));
            replies.truncate(replies_per_comment);

            TopComment {
                item: item.clone(),
                score: breakdown.like_component + breakdown.reply_component,
                breakdown,
                replies,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(n);
    ranked
}

/// Statistics for one annotation tag.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeywordSegment {
    pub mentions: usize,
    pub total_likes: u64,
    pub average_likes: f64,
    /// Parent resource id → mentions.
    pub by_resource: BTreeMap<String, usize>,
    pub sentiment: BTreeMap<Sentiment, usize>,
    pub top_items: Vec<HarvestItem>,
}

/// Group annotated items by tag. Items without annotations are ignored.
pub fn keyword_segments(batch: &HarvestBatch) -> BTreeMap<String, KeywordSegment> {
    let mut segments: BTreeMap<String, KeywordSegment> = BTreeMap::new();

    for (resource_id, resource_batch) in &batch.resources {
        for item in resource_batch.children.values().flat_map(|c| c.items.iter()) {
            let Some(annotation) = &item.annotation else {
                continue;
            };
            for tag in &annotation.tags {
                let segment = segments.entry(tag.clone()).or_default();
                segment.mentions += 1;
                segment.total_likes += item.like_count;
                *segment.by_resource.entry(resource_id.clone()).or_default() += 1;
                *segment.sentiment.entry(annotation.sentiment).or_default() += 1;
                segment.top_items.push(item.clone());
            }
        }
    }

    for segment in segments.values_mut() {
        segment.average_likes = segment.total_likes as f64 / segment.mentions as f64;
        segment.top_items.sort_by(|a, b| b.like_count.cmp(&a.like_count));
        segment.top_items.truncate(SEGMENT_TOP_ITEMS);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Annotation, ChildResource, Resource};
    use crate::testutil::{item, reply};
    use std::collections::BTreeSet;

    fn tagged(id: &str, likes: u64, tags: &[&str], sentiment: Sentiment) -> HarvestItem {
        let mut item = item(id, likes);
        item.annotation = Some(Annotation {
            cleaned_text: item.raw_text.clone(),
            tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            sentiment,
        });
        item
    }

    fn batch_of(resource: &str, items: Vec<HarvestItem>) -> HarvestBatch {
        let mut batch = HarvestBatch::new();
        batch.merge_items(
            &Resource::new(resource, resource),
            &ChildResource::new(format!("{resource}-v"), resource, "Video", 10),
            items,
        );
        batch
    }

    #[test]
    fn test_engagement_score() {
        assert_eq!(engagement_score(0, 0), 0.0);
        let expected = 0.7 * 10f64.ln() + 0.3 * 3f64.ln();
        assert!((engagement_score(9, 2) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_top_comments_ranking_and_replies() {
        let mut popular = item("t1", 50);
        popular.reply_count = 4;
        let items = vec![
            item("t0", 1),
            popular,
            item("t2", 10),
            reply("r1", "t1", 1),
            reply("r2", "t1", 7),
            reply("r3", "t1", 3),
            reply("r4", "t1", 5),
        ];
        let batch = batch_of("c1", items);

        let top = top_comments(&batch, 2, 3);
        let ids: Vec<_> = top.iter().map(|t| t.item.item_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        let reply_ids: Vec<_> = top[0].replies.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(reply_ids, vec!["r2", "r4", "r3"]);
        let b = top[0].breakdown;
        assert!((b.like_component + b.reply_component - top[0].score).abs() < 1e-12);
    }

    #[test]
    fn test_keyword_segments() {
        let batch = batch_of(
            "c1",
            vec![
                tagged("a", 4, &["exam", "physics"], Sentiment::Positive),
                tagged("b", 2, &["exam"], Sentiment::Negative),
                item("c", 100),
            ],
        );

        let segments = keyword_segments(&batch);
        assert_eq!(segments.len(), 2);

        let exam = &segments["exam"];
        assert_eq!(exam.mentions, 2);
        assert_eq!(exam.total_likes, 6);
        assert!((exam.average_likes - 3.0).abs() < 1e-12);
        assert_eq!(exam.by_resource["c1"], 2);
        assert_eq!(exam.sentiment[&Sentiment::Negative], 1);
        assert_eq!(exam.top_items[0].item_id, "a");
        assert_eq!(segments["physics"].mentions, 1);
    }
}
