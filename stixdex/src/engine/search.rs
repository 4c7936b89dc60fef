//! Free-text search string handling.
//!
//! Search input arrives from interactive callers and is messy: quoted
//! phrases for exact matching, bracketed or punctuated fragments, and
//! sometimes still percent-encoded. The parser splits the input into
//! phrases and loose terms; phrases must all match, loose terms are a
//! union.

use nom::branch::alt;
use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::map;
use nom::multi::many0;
use nom::sequence::{delimited, preceded};
use nom::IResult;
use stixdex_store::Predicate;

/// Parsed search input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchTerms {
    pub phrases: Vec<String>,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Fragment {
    Phrase(String),
    Term(String),
}

fn quoted(input: &str) -> IResult<&str, Fragment> {
    map(
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        |s: &str| Fragment::Phrase(s.to_string()),
    )(input)
}

fn bare(input: &str) -> IResult<&str, Fragment> {
    map(
        take_while1(|c: char| !c.is_whitespace() && c != '"'),
        |s: &str| Fragment::Term(s.to_string()),
    )(input)
}

fn fragments(input: &str) -> IResult<&str, Vec<Fragment>> {
    many0(preceded(multispace0, alt((quoted, bare))))(input)
}

/// Parse a raw search string.
///
/// Well-formed percent-encoded input is decoded first; input with a
/// stray `%` is taken verbatim.
pub fn parse_search(raw: &str) -> SearchTerms {
    let decoded = percent_decode(raw).unwrap_or_else(|| raw.to_string());
    let mut out = SearchTerms::default();
    let (_, parts) = fragments(&decoded).unwrap_or(("", Vec::new()));
    for part in parts {
        match part {
            Fragment::Phrase(p) if !p.trim().is_empty() => out.phrases.push(p),
            Fragment::Term(t) if !t.trim().is_empty() => out.terms.push(t),
            _ => {}
        }
    }
    out
}

/// Build the search predicate for a raw search string, `None` when the
/// input carries no usable token.
pub fn search_predicate(raw: &str) -> Option<Predicate> {
    let parsed = parse_search(raw);
    let mut parts: Vec<Predicate> =
        parsed.phrases.iter().map(|p| Predicate::phrase_any(p.clone())).collect();
    if !parsed.terms.is_empty() {
        // Loose terms union through analyzed matching: any term hit
        // qualifies the document.
        parts.push(Predicate::match_any(parsed.terms.join(" ")));
    }
    if parts.is_empty() {
        return None;
    }
    Some(Predicate::all(parts))
}

fn percent_decode(raw: &str) -> Option<String> {
    if !raw.contains('%') {
        return None;
    }
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            let value = u8::from_str_radix(hex, 16).ok()?;
            out.push(value);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
