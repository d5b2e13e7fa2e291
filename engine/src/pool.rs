//! Append-only comment transcript
//!
//! The pool is owned by the trial loop for one session and handed to experts
//! by shared reference only, so the loop is its single writer. Insertion order
//! is the only order and is also causal order.

use sdk::types::{Comment, Direction, ExpertId};
use serde::{Deserialize, Serialize};

/// Predicate over `{author, round, direction}`; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentFilter {
    pub author: Option<ExpertId>,
    pub round: Option<u32>,
    pub up_to_round: Option<u32>,
    pub direction: Option<Direction>,
}

impl CommentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_author(mut self, author: &ExpertId) -> Self {
        self.author = Some(author.clone());
        self
    }

    pub fn in_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    /// Rounds `0..=round`
    pub fn up_to_round(mut self, round: u32) -> Self {
        self.up_to_round = Some(round);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn matches(&self, comment: &Comment) -> bool {
        self.author.as_ref().map_or(true, |a| comment.author() == a)
            && self.round.map_or(true, |r| comment.round() == r)
            && self.up_to_round.map_or(true, |r| comment.round() <= r)
            && self.direction.map_or(true, |d| comment.direction() == d)
    }
}

/// Ordered, append-only store of comments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentPool {
    comments: Vec<Comment>,
}

impl CommentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a comment at the end of the transcript
    pub fn append(&mut self, comment: Comment) {
        tracing::debug!(
            author = %comment.author(),
            round = comment.round(),
            direction = %comment.direction(),
            chars = comment.content().len(),
            "comment appended"
        );
        self.comments.push(comment);
    }

    /// Matching comments in insertion order
    pub fn query(&self, filter: &CommentFilter) -> Vec<&Comment> {
        self.comments.iter().filter(|c| filter.matches(c)).collect()
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter()
    }

    pub fn as_slice(&self) -> &[Comment] {
        &self.comments
    }

    /// Text form of the matching comments, used as prompt context
    pub fn render(&self, filter: &CommentFilter) -> String {
        render_comments(self.query(filter))
    }
}

/// Text form of a comment sequence
pub fn render_comments<'a>(comments: impl IntoIterator<Item = &'a Comment>) -> String {
    let mut out = String::new();
    for comment in comments {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "[{} | round {} | {}]\n{}",
            comment.author(),
            comment.round(),
            comment.direction(),
            comment.content().trim()
        ));
    }
    out
}
