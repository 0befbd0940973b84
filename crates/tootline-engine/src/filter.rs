//! Client-side evaluation of the server's keyword filters.
//!
//! The server stores rules; matching is on us. At construction the engine
//! keeps only rules that are unexpired and apply in the timeline's contexts,
//! then folds their phrases into two case-insensitive patterns: one whose
//! match hides a post outright, one whose match collapses it behind a
//! warning. Classification runs against what a reader would actually see:
//! spoiler text, tag-stripped content, poll options, media descriptions.
//!
//! The home-feed preference gates (no replies, no boosts) live here too,
//! checked before any phrase, so "drop" decisions come from one place.

use chrono::{DateTime, Utc};
use regex::Regex;
use tootline_types::{FilterAction, FilterContext, FilterRule, Status};

#[derive(Clone)]
pub struct FilterEngine {
    hide: Option<Regex>,
    warn: Option<Regex>,
    drop_replies: bool,
    drop_boosts: bool,
}

impl FilterEngine {
    /// An engine that lets everything through. The fallback when filter
    /// rules could not be fetched.
    pub fn pass_all() -> Self {
        Self {
            hide: None,
            warn: None,
            drop_replies: false,
            drop_boosts: false,
        }
    }

    /// Compile the rules relevant to a timeline showing the given contexts.
    /// Rules already expired at `now` are dropped for good; re-fetching the
    /// rule set is the only way back in.
    pub fn new(rules: &[FilterRule], contexts: &[FilterContext], now: DateTime<Utc>) -> Self {
        let relevant = |rule: &&FilterRule| {
            !rule.is_expired(now)
                && !rule.phrase.is_empty()
                && contexts.iter().any(|c| rule.applies_in(*c))
        };
        let hide_tokens: Vec<String> = rules
            .iter()
            .filter(relevant)
            .filter(|r| r.action() == FilterAction::Hide)
            .map(rule_token)
            .collect();
        let warn_tokens: Vec<String> = rules
            .iter()
            .filter(relevant)
            .filter(|r| r.action() == FilterAction::Warn)
            .map(rule_token)
            .collect();

        Self {
            hide: build_pattern(&hide_tokens),
            warn: build_pattern(&warn_tokens),
            drop_replies: false,
            drop_boosts: false,
        }
    }

    /// Home-feed preference gates. A gated post classifies as `Hide`.
    pub fn with_gates(mut self, drop_replies: bool, drop_boosts: bool) -> Self {
        self.drop_replies = drop_replies;
        self.drop_boosts = drop_boosts;
        self
    }

    /// The strongest verdict any rule reaches on this status.
    pub fn classify(&self, status: &Status) -> FilterAction {
        if self.drop_boosts && status.is_boost() {
            return FilterAction::Hide;
        }
        if self.drop_replies && status.is_reply() {
            return FilterAction::Hide;
        }
        if self.hide.is_none() && self.warn.is_none() {
            return FilterAction::None;
        }
        let text = matchable_text(status.actionable());
        if self.hide.as_ref().is_some_and(|p| p.is_match(&text)) {
            return FilterAction::Hide;
        }
        if self.warn.as_ref().is_some_and(|p| p.is_match(&text)) {
            return FilterAction::Warn;
        }
        FilterAction::None
    }
}

/// One alternation branch per rule: the phrase literally, wrapped in
/// non-word boundaries when the rule asks for whole words.
fn rule_token(rule: &FilterRule) -> String {
    let escaped = regex::escape(&rule.phrase);
    if rule.whole_word {
        format!(r"(?:^|\W){escaped}(?:$|\W)")
    } else {
        escaped
    }
}

fn build_pattern(tokens: &[String]) -> Option<Regex> {
    if tokens.is_empty() {
        return None;
    }
    let pattern = format!("(?i)(?:{})", tokens.join("|"));
    match Regex::new(&pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(%e, "filter pattern failed to compile; rules inert");
            None
        }
    }
}

/// Everything a reader would see of a status, as plain text.
fn matchable_text(status: &Status) -> String {
    let mut text = String::new();
    if !status.spoiler_text.is_empty() {
        text.push_str(&status.spoiler_text);
        text.push('\n');
    }
    text.push_str(&strip_html(&status.content));
    if let Some(poll) = &status.poll {
        for option in &poll.options {
            text.push('\n');
            text.push_str(&option.title);
        }
    }
    for attachment in &status.media_attachments {
        if let Some(description) = &attachment.description {
            text.push('\n');
            text.push_str(description);
        }
    }
    text
}

/// Drop tags, decode the entities Mastodon's sanitizer emits. Tags become
/// spaces so adjacent words don't fuse across element boundaries.
fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tootline_types::{PollOption, StatusId};

    fn rule(phrase: &str) -> FilterRule {
        FilterRule {
            id: "1".to_string(),
            phrase: phrase.to_string(),
            context: vec![FilterContext::Home],
            whole_word: false,
            irreversible: false,
            expires_at: None,
        }
    }

    fn engine(rules: &[FilterRule]) -> FilterEngine {
        FilterEngine::new(rules, &[FilterContext::Home], Utc::now())
    }

    fn post(content: &str) -> Status {
        Status {
            id: StatusId::from("1"),
            content: content.to_string(),
            ..Status::default()
        }
    }

    // ── Phrase matching ─────────────────────────────────────────────────

    #[test]
    fn test_match_is_case_insensitive() {
        let engine = engine(&[rule("Spoilers")]);
        assert_eq!(
            engine.classify(&post("<p>no SPOILERS please</p>")),
            FilterAction::Warn
        );
        assert_eq!(engine.classify(&post("<p>all fine</p>")), FilterAction::None);
    }

    #[test]
    fn test_whole_word_respects_boundaries() {
        let mut whole = rule("cat");
        whole.whole_word = true;
        let engine_whole = engine(&[whole]);
        assert_eq!(
            engine_whole.classify(&post("<p>concatenate</p>")),
            FilterAction::None
        );
        assert_eq!(
            engine_whole.classify(&post("<p>my cat sleeps</p>")),
            FilterAction::Warn
        );

        let engine_substring = engine(&[rule("cat")]);
        assert_eq!(
            engine_substring.classify(&post("<p>concatenate</p>")),
            FilterAction::Warn
        );
    }

    #[test]
    fn test_phrase_with_regex_metacharacters_is_literal() {
        let engine = engine(&[rule("what?!")]);
        assert_eq!(engine.classify(&post("<p>what?!</p>")), FilterAction::Warn);
        assert_eq!(engine.classify(&post("<p>what</p>")), FilterAction::None);
    }

    #[test]
    fn test_irreversible_rule_hides_and_outranks_warn() {
        let mut hide = rule("leak");
        hide.irreversible = true;
        let warn = rule("leak");
        let engine = engine(&[warn, hide]);
        assert_eq!(engine.classify(&post("<p>the leak</p>")), FilterAction::Hide);
    }

    // ── Rule selection ──────────────────────────────────────────────────

    #[test]
    fn test_expired_rule_is_inert() {
        let mut expired = rule("old");
        expired.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        let engine = engine(&[expired]);
        assert_eq!(engine.classify(&post("<p>old news</p>")), FilterAction::None);
    }

    #[test]
    fn test_other_context_rule_is_inert() {
        let mut elsewhere = rule("word");
        elsewhere.context = vec![FilterContext::Notifications];
        let engine = engine(&[elsewhere]);
        assert_eq!(engine.classify(&post("<p>word</p>")), FilterAction::None);
    }

    #[test]
    fn test_empty_rule_set_allows_everything() {
        let engine = engine(&[]);
        assert_eq!(engine.classify(&post("<p>anything</p>")), FilterAction::None);
    }

    // ── What gets matched ───────────────────────────────────────────────

    #[test]
    fn test_markup_is_not_matchable() {
        let engine = engine(&[rule("span")]);
        assert_eq!(
            engine.classify(&post(r#"<p><span class="h-card">text</span></p>"#)),
            FilterAction::None
        );
    }

    #[test]
    fn test_entities_are_decoded_before_matching() {
        let engine = engine(&[rule("at&t")]);
        assert_eq!(engine.classify(&post("<p>AT&amp;T news</p>")), FilterAction::Warn);
    }

    #[test]
    fn test_spoiler_text_is_matched() {
        let engine = engine(&[rule("finale")]);
        let mut status = post("<p>safe body</p>");
        status.spoiler_text = "season finale".to_string();
        assert_eq!(engine.classify(&status), FilterAction::Warn);
    }

    #[test]
    fn test_poll_options_are_matched() {
        let engine = engine(&[rule("pineapple")]);
        let mut status = post("<p>important poll</p>");
        status.poll = Some(tootline_types::Poll {
            id: "9".to_string(),
            options: vec![
                PollOption {
                    title: "pineapple pizza".to_string(),
                    votes_count: None,
                },
                PollOption {
                    title: "plain".to_string(),
                    votes_count: None,
                },
            ],
            ..tootline_types::Poll::default()
        });
        assert_eq!(engine.classify(&status), FilterAction::Warn);
    }

    #[test]
    fn test_boost_is_classified_by_inner_status() {
        let engine = engine(&[rule("inner")]);
        let mut boost = post("");
        boost.reblog = Some(Box::new(post("<p>inner thoughts</p>")));
        assert_eq!(engine.classify(&boost), FilterAction::Warn);
    }

    // ── Preference gates ────────────────────────────────────────────────

    #[test]
    fn test_boost_gate() {
        let engine = FilterEngine::pass_all().with_gates(false, true);
        let mut boost = post("");
        boost.reblog = Some(Box::new(post("<p>x</p>")));
        assert_eq!(engine.classify(&boost), FilterAction::Hide);
        assert_eq!(engine.classify(&post("<p>x</p>")), FilterAction::None);
    }

    #[test]
    fn test_reply_gate() {
        let engine = FilterEngine::pass_all().with_gates(true, false);
        let mut reply = post("<p>x</p>");
        reply.in_reply_to_id = Some(StatusId::from("5"));
        assert_eq!(engine.classify(&reply), FilterAction::Hide);
    }

    #[test]
    fn test_gates_run_before_phrases() {
        let mut hide = rule("never-present");
        hide.irreversible = true;
        let engine = engine(&[hide]).with_gates(true, false);
        let mut reply = post("<p>clean text</p>");
        reply.in_reply_to_id = Some(StatusId::from("5"));
        assert_eq!(engine.classify(&reply), FilterAction::Hide);
    }
}
