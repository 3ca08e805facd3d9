//! C3 Message Deduplicator: reduces an email thread into unique messages
//! plus an occurrence audit trail.
//!
//! Uses the `once_cell::sync::Lazy<Regex>` idiom for static patterns,
//! matching how the rest of the workspace compiles regexes once.

use archivist_core::ids::sha256_hex;
use once_cell::sync::Lazy;
use regex::Regex;
use storage::rows::{ContextType, IndividualMessage, MessageContentType, MessageOccurrence};

static REPLY_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^On .{3,80}wrote:\s*$").expect("valid regex"));

static FORWARD_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^-{5,}\s*Forwarded [Mm]essage\s*-{5,}\s*$").expect("valid regex")
});

static QUOTE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(>+)\s?").expect("valid regex"));

const MIN_SIGNIFICANT_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    None,
    Reply,
    Forward,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSegment {
    pub text: String,
    pub content_type: MessageContentType,
    pub context_type: ContextType,
    pub quote_depth: u32,
    pub position_in_email: usize,
}

/// Normalizes and detects message boundaries by a
/// priority-ordered set of heuristics: (a) reply headers, (b) forwarded
/// blocks, (c) runs of consecutive quote-prefixed lines. A run boundary
/// flushes the current buffer as its own segment, so a single reply email
/// that both quotes a prior message verbatim and adds new commentary
/// produces one quoted segment and one non-quoted segment. An unparseable
/// boundary (no headers, no quoting) falls through to a single `original`
/// segment at depth 0.
pub fn split_into_segments(raw_text: &str) -> Vec<ThreadSegment> {
    let normalized = strip_html(raw_text);
    let lines: Vec<&str> = normalized.lines().collect();

    let mut current_header = HeaderKind::None;
    let mut position = 0usize;
    let mut segments = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut buffer_quoted = false;

    for line in &lines {
        if REPLY_HEADER.is_match(line) {
            flush_buffer(&mut buffer, buffer_quoted, current_header, &mut position, &mut segments);
            current_header = HeaderKind::Reply;
            buffer_quoted = false;
            continue;
        }
        if FORWARD_HEADER.is_match(line) {
            flush_buffer(&mut buffer, buffer_quoted, current_header, &mut position, &mut segments);
            current_header = HeaderKind::Forward;
            buffer_quoted = false;
            continue;
        }

        let is_quoted_line = QUOTE_PREFIX.is_match(line);
        if is_quoted_line != buffer_quoted && !buffer.is_empty() {
            flush_buffer(&mut buffer, buffer_quoted, current_header, &mut position, &mut segments);
        }
        buffer_quoted = is_quoted_line;
        buffer.push(line);
    }
    flush_buffer(&mut buffer, buffer_quoted, current_header, &mut position, &mut segments);

    segments
}

fn flush_buffer(
    buffer: &mut Vec<&str>,
    buffer_quoted: bool,
    header: HeaderKind,
    position: &mut usize,
    segments: &mut Vec<ThreadSegment>,
) {
    if buffer.is_empty() {
        return;
    }
    let text = buffer.join("\n");
    buffer.clear();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }

    let quote_depth = max_quote_depth(&text);
    let (content_type, context_type) = if buffer_quoted {
        // A quoted run is a verbatim repeat of a message seen elsewhere;
        // its own nature is treated as `original` until disambiguated by a
        // matching message_hash from a non-quoted appearance.
        (MessageContentType::Original, ContextType::Quoted)
    } else {
        match header {
            HeaderKind::Forward => (MessageContentType::Forward, ContextType::Forwarded),
            HeaderKind::Reply => (MessageContentType::Reply, ContextType::Original),
            HeaderKind::None => (MessageContentType::Original, ContextType::Original),
        }
    };

    segments.push(ThreadSegment {
        text: trimmed.to_string(),
        content_type,
        context_type,
        quote_depth,
        position_in_email: *position,
    });
    *position += 1;
}

fn max_quote_depth(text: &str) -> u32 {
    text.lines()
        .filter_map(|line| QUOTE_PREFIX.captures(line))
        .map(|caps| caps[1].len() as u32)
        .max()
        .unwrap_or(0)
}

/// Conservative HTML-to-text cleaner that preserves line breaks and
/// quoted-prefix markers.
pub fn strip_html(input: &str) -> String {
    if !input.contains("</") && !input.contains("<br") && !input.contains("<p>") {
        return input.to_string();
    }

    let with_breaks = input
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n")
        .replace("</div>", "\n");

    let mut out = String::with_capacity(with_breaks.len());
    let mut in_tag = false;
    for ch in with_breaks.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    html_escape::decode_html_entities(&out).into_owned()
}

/// Canonical form collapses internal whitespace and trims
/// per-line quote markers; sender/date are folded in separately by
/// [`message_hash`] once normalized to ISO 8601 UTC by the caller.
pub fn canonicalize(text: &str) -> String {
    text.lines()
        .map(|line| QUOTE_PREFIX.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn message_hash(
    canonical_text: &str,
    sender_email: &str,
    date_sent: chrono::DateTime<chrono::Utc>,
) -> String {
    let basis = format!("{}|{}|{}", canonical_text, sender_email, date_sent.to_rfc3339());
    sha256_hex(basis.as_bytes())
}

#[derive(Debug, Clone)]
pub struct DedupInput {
    pub email_id: String,
    pub raw_text: String,
    pub sender_email: String,
    pub date_sent: chrono::DateTime<chrono::Utc>,
    pub thread_id: String,
    pub message_id: Option<String>,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub struct DedupOutput {
    pub messages: Vec<IndividualMessage>,
    pub occurrences: Vec<MessageOccurrence>,
}

/// Runs the full segmentation/dedup pipeline for one email. Callers upsert `messages` and
/// append `occurrences` through `storage::Repository`; emitting one Content
/// row of `source_type=email_message` per **unique** `message_hash` (not per
/// occurrence) is the caller's responsibility once messages are persisted.
pub fn deduplicate_email(input: &DedupInput) -> DedupOutput {
    let now = chrono::Utc::now();
    let mut messages = Vec::new();
    let mut occurrences = Vec::new();

    for segment in split_into_segments(&input.raw_text) {
        let canonical = canonicalize(&segment.text);
        let is_signature_only =
            segment.text.chars().filter(|c| !c.is_whitespace()).count() < MIN_SIGNIFICANT_CHARS;

        let hash = message_hash(&canonical, &input.sender_email, input.date_sent);

        occurrences.push(MessageOccurrence {
            message_hash: hash.clone(),
            email_id: input.email_id.clone(),
            position_in_email: segment.position_in_email,
            context_type: segment.context_type,
            quote_depth: segment.quote_depth,
            created_at: now,
        });

        // Signature-only segments are dropped from the unique-message set
        // but retained in the occurrence audit above for evidence
        // preservation (legal harassment patterns).
        if is_signature_only {
            continue;
        }

        if messages.iter().any(|m: &IndividualMessage| m.message_hash == hash) {
            continue;
        }

        messages.push(IndividualMessage {
            message_hash: hash,
            content: segment.text.clone(),
            subject: input.subject.clone(),
            sender_email: input.sender_email.clone(),
            recipients: Vec::new(),
            date_sent: input.date_sent,
            message_id: input.message_id.clone(),
            thread_id: input.thread_id.clone(),
            content_type: segment.content_type,
            created_at: now,
            updated_at: now,
        });
    }

    DedupOutput {
        messages,
        occurrences,
    }
}
