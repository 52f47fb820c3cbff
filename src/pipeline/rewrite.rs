//! Resource-reference rewriting.
//!
//! Scans outgoing HTML for script tags whose `src` points at the internal
//! resource endpoint and redirects them through the resource proxy route:
//!
//! ```text
//! <script src="/WebResource.axd?d=abc" type="text/javascript"></script>
//!                       ↓
//! <script src="/resource-proxy?path=http%3A%2F%2Fhost%2FWebResource.axd%3Fd%3Dabc" ...
//! ```
//!
//! # Design Decisions
//! - Bytes are matched as single-byte text with ASCII case folding; bytes
//!   outside matched `src` values pass through untouched, so UTF-8 or any
//!   other encoding survives intact
//! - Only the `src` value inside a matched opening tag is replaced
//! - A trailing fragment that may be the start of an unfinished `<script` tag
//!   is held back until the next write, bounded by [`MAX_LOOKBACK`]

use std::io::{self, Write};
use std::ops::Range;

use regex::bytes::Regex;
use tracing::{debug, trace};
use url::Url;

/// Longest unfinished tag fragment held back between writes.
pub const MAX_LOOKBACK: usize = 8 * 1024;

const SCRIPT_OPEN: &[u8] = b"<script";

/// Compiled, request-independent rewrite settings.
///
/// Built once at startup and shared by every response.
#[derive(Debug, Clone)]
pub struct RewriteRules {
    pattern: Regex,
    marker: Vec<u8>,
    route_prefix: String,
}

impl RewriteRules {
    /// `relative_root` must start and end with '/'.
    pub fn new(marker: &str, relative_root: &str, proxy_route: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(
            r#"(?i-u)<script\s(?:[^>]*?\s)?src\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>"#,
        )?;

        Ok(Self {
            pattern,
            marker: marker.trim().to_ascii_lowercase().into_bytes(),
            route_prefix: format!("{}{}?path=", relative_root, proxy_route),
        })
    }

    /// Bind the rules to the origin (`scheme://authority`) of one request.
    pub fn for_origin(&self, origin: &str) -> Option<RewriteContext> {
        let base = Url::parse(origin).ok()?;
        Some(RewriteContext {
            rules: self.clone(),
            base,
        })
    }

    fn references_marker(&self, value: &[u8]) -> bool {
        !self.marker.is_empty()
            && value
                .windows(self.marker.len())
                .any(|w| w.eq_ignore_ascii_case(&self.marker))
    }
}

/// Rewrite rules bound to a single request.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    rules: RewriteRules,
    base: Url,
}

impl RewriteContext {
    /// Proxy URL for a `src` value, or `None` if it cannot be made absolute.
    pub fn proxied(&self, src: &str) -> Option<String> {
        let absolute = self.base.join(src).ok()?;
        Some(format!(
            "{}{}",
            self.rules.route_prefix,
            urlencoding::encode(absolute.as_str())
        ))
    }

    /// Rewrite every matching tag in `input`, returning the output and the
    /// number of substitutions.
    pub fn rewrite(&self, input: &[u8]) -> (Vec<u8>, usize) {
        let mut output = Vec::with_capacity(input.len());
        let mut copied = 0;
        let mut count = 0;

        for caps in self.rules.pattern.captures_iter(input) {
            let Some(value) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            if !self.rules.references_marker(value.as_bytes()) {
                continue;
            }
            let Some(replacement) = self.replacement_for(value.as_bytes()) else {
                continue;
            };

            let span: Range<usize> = value.range();
            output.extend_from_slice(&input[copied..span.start]);
            output.extend_from_slice(replacement.as_bytes());
            copied = span.end;
            count += 1;
        }

        output.extend_from_slice(&input[copied..]);
        (output, count)
    }

    fn replacement_for(&self, value: &[u8]) -> Option<String> {
        // Non-UTF-8 references are left alone.
        let src = std::str::from_utf8(value).ok()?;
        // Attribute text is HTML; `&amp;` separates query parameters.
        self.proxied(html_escape::decode_html_entities(src.trim()).as_ref())
    }
}

/// Stream stage that rewrites resource references before passing bytes on.
pub struct ResourceRewriter<W: Write> {
    inner: W,
    context: RewriteContext,
    pending: Vec<u8>,
    rewrites: usize,
}

impl<W: Write> ResourceRewriter<W> {
    pub fn new(inner: W, context: RewriteContext) -> Self {
        Self {
            inner,
            context,
            pending: Vec::new(),
            rewrites: 0,
        }
    }

    /// Number of references rewritten so far.
    pub fn rewrites(&self) -> usize {
        self.rewrites
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Release any held fragment and flush the inner stage.
    ///
    /// Returns the inner stage so it can be finalized in turn.
    pub fn finish(mut self) -> io::Result<W> {
        self.emit(true)?;
        self.inner.flush()?;
        debug!(rewrites = self.rewrites, "Resource rewriter finished");
        Ok(self.inner)
    }

    fn emit(&mut self, release_all: bool) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let data = std::mem::take(&mut self.pending);
        let hold = if release_all { data.len() } else { hold_point(&data) };
        let (ready, rest) = data.split_at(hold);

        if !ready.is_empty() {
            let (out, count) = self.context.rewrite(ready);
            self.rewrites += count;
            self.inner.write_all(&out)?;
        }
        if !rest.is_empty() {
            trace!(held = rest.len(), "Holding partial tag for next write");
            self.pending.extend_from_slice(rest);
        }
        Ok(())
    }
}

impl<W: Write> Write for ResourceRewriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.emit(false)?;
        Ok(buf.len())
    }

    /// Held tag fragments stay held; everything else reaches the inner stage.
    fn flush(&mut self) -> io::Result<()> {
        self.emit(false)?;
        self.inner.flush()
    }
}

/// Offset where a possibly unfinished `<script` tag starts, or `data.len()`.
///
/// Only the last [`MAX_LOOKBACK`] bytes are considered. Complete tags are
/// skipped as a whole, so a `<` inside a quoted attribute value does not hide
/// the tag it belongs to.
fn hold_point(data: &[u8]) -> usize {
    let mut pos = data.len().saturating_sub(MAX_LOOKBACK);

    while let Some(offset) = data[pos..].iter().position(|&b| b == b'<') {
        let start = pos + offset;
        let tail = &data[start..];

        if tail.len() <= SCRIPT_OPEN.len() {
            if SCRIPT_OPEN[..tail.len()].eq_ignore_ascii_case(tail) {
                return start;
            }
            pos = start + 1;
            continue;
        }

        let opens_script = tail[..SCRIPT_OPEN.len()].eq_ignore_ascii_case(SCRIPT_OPEN)
            && tail[SCRIPT_OPEN.len()].is_ascii_whitespace();
        if !opens_script {
            pos = start + 1;
            continue;
        }

        match tag_end(&tail[SCRIPT_OPEN.len()..]) {
            Some(end) => pos = start + SCRIPT_OPEN.len() + end + 1,
            None => return start,
        }
    }

    data.len()
}

/// Offset of the `>` closing a tag's attribute list, ignoring quoted values.
fn tag_end(attributes: &[u8]) -> Option<usize> {
    let mut quote = None;
    for (i, &b) in attributes.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RewriteContext {
        RewriteRules::new("webresource.axd", "/", "resource-proxy")
            .unwrap()
            .for_origin("http://example.com")
            .unwrap()
    }

    const PROXIED: &str =
        "/resource-proxy?path=http%3A%2F%2Fexample.com%2FWebResource.axd%3Fd%3Dabc";

    fn rewrite_in_writes(parts: &[&[u8]]) -> (String, usize) {
        let mut rewriter = ResourceRewriter::new(Vec::new(), context());
        for part in parts {
            rewriter.write_all(part).unwrap();
        }
        let count = rewriter.rewrites();
        let out = rewriter.finish().unwrap();
        (String::from_utf8(out).unwrap(), count)
    }

    #[test]
    fn test_single_tag_rewritten() {
        let html = br#"<head><script src="/WebResource.axd?d=abc" type="text/javascript"></script></head>"#;
        let (out, count) = context().rewrite(html);
        assert_eq!(count, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!(r#"<head><script src="{PROXIED}" type="text/javascript"></script></head>"#)
        );
    }

    #[test]
    fn test_only_matched_tag_span_is_replaced() {
        let html = concat!(
            r#"<p>Load /WebResource.axd?d=abc manually</p>"#,
            r#"<SCRIPT type="text/javascript" SRC='/WebResource.axd?d=abc'>var x = 1;</SCRIPT>"#,
            r#"<a href="/WebResource.axd?d=abc">raw</a>"#,
        );
        let (out, count) = context().rewrite(html.as_bytes());
        let out = String::from_utf8(out).unwrap();

        assert_eq!(count, 1);
        assert!(out.starts_with("<p>Load /WebResource.axd?d=abc manually</p>"));
        assert!(out.contains(&format!("SRC='{PROXIED}'>var x = 1;</SCRIPT>")));
        assert!(out.ends_with(r#"<a href="/WebResource.axd?d=abc">raw</a>"#));
    }

    #[test]
    fn test_entities_in_src_are_decoded() {
        let html = br#"<script src="/WebResource.axd?d=abc&amp;t=1"></script>"#;
        let (out, count) = context().rewrite(html);
        assert_eq!(count, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!(r#"<script src="{PROXIED}%26t%3D1"></script>"#)
        );
    }

    #[test]
    fn test_unrelated_scripts_untouched() {
        let html = br#"<script src="/js/site.js"></script><scripts src="/WebResource.axd"></scripts>"#;
        let (out, count) = context().rewrite(html);
        assert_eq!(count, 0);
        assert_eq!(out, html.to_vec());
    }

    #[test]
    fn test_absolute_src_kept_absolute() {
        let html = br#"<script src="https://cdn.example.net/WebResource.axd?d=1"></script>"#;
        let (out, _) = context().rewrite(html);
        assert!(String::from_utf8(out)
            .unwrap()
            .contains("path=https%3A%2F%2Fcdn.example.net%2FWebResource.axd%3Fd%3D1"));
    }

    #[test]
    fn test_virtual_root_prefix() {
        let ctx = RewriteRules::new("webresource.axd", "/blog/", "resource-proxy")
            .unwrap()
            .for_origin("https://example.com:8443")
            .unwrap();
        assert_eq!(
            ctx.proxied("/blog/WebResource.axd?d=x").unwrap(),
            "/blog/resource-proxy?path=https%3A%2F%2Fexample.com%3A8443%2Fblog%2FWebResource.axd%3Fd%3Dx"
        );
    }

    #[test]
    fn test_custom_marker() {
        let ctx = RewriteRules::new("resource-proxy-marker", "/", "resource-proxy")
            .unwrap()
            .for_origin("http://example.com")
            .unwrap();
        let html = br#"<p>/resource-proxy-marker?x=1</p><script src="/resource-proxy-marker?x=1"></script>"#;
        let (out, count) = ctx.rewrite(html);
        let out = String::from_utf8(out).unwrap();
        assert_eq!(count, 1);
        assert!(out.starts_with("<p>/resource-proxy-marker?x=1</p>"));
        assert!(out.contains(
            r#"<script src="/resource-proxy?path=http%3A%2F%2Fexample.com%2Fresource-proxy-marker%3Fx%3D1"></script>"#
        ));
    }

    #[test]
    fn test_tag_split_across_writes() {
        let html = r#"<body><script src="/WebResource.axd?d=abc" type="text/javascript"></script></body>"#;
        let expected = html.replace("/WebResource.axd?d=abc", PROXIED);

        for split in 1..html.len() {
            let (a, b) = html.as_bytes().split_at(split);
            let (out, count) = rewrite_in_writes(&[a, b]);
            assert_eq!(out, expected, "split at {split}");
            assert_eq!(count, 1, "split at {split}");
        }
    }

    #[test]
    fn test_split_tag_with_angle_bracket_in_attribute() {
        let html = r#"<script data-x="a<b" src="/WebResource.axd?d=abc"></script><p>after</p>"#;
        let expected = html.replace("/WebResource.axd?d=abc", PROXIED);

        for split in 1..html.len() {
            let (a, b) = html.as_bytes().split_at(split);
            let (out, count) = rewrite_in_writes(&[a, b]);
            assert_eq!(out, expected, "split at {split}");
            assert_eq!(count, 1, "split at {split}");
        }
    }

    #[test]
    fn test_tag_split_across_many_writes() {
        let html = r#"<script src="/WebResource.axd?d=abc"></script>"#;
        let parts: Vec<&[u8]> = html.as_bytes().chunks(3).collect();
        let (out, count) = rewrite_in_writes(&parts);
        assert_eq!(count, 1);
        assert_eq!(out, html.replace("/WebResource.axd?d=abc", PROXIED));
    }

    #[test]
    fn test_non_ascii_passthrough() {
        let html = "<p>Grüße, 日本語</p><script src=\"/WebResource.axd?d=abc\"></script><p>ü</p>";
        let (out, count) = rewrite_in_writes(&[html.as_bytes()]);
        assert_eq!(count, 1);
        assert_eq!(out, html.replace("/WebResource.axd?d=abc", PROXIED));

        let latin1: &[u8] = b"<p>\xe9t\xe9</p><script src=\"/WebResource.axd?d=abc\"></script>";
        let mut rewriter = ResourceRewriter::new(Vec::new(), context());
        rewriter.write_all(latin1).unwrap();
        let out = rewriter.finish().unwrap();
        assert!(out.starts_with(b"<p>\xe9t\xe9</p><script src=\"/resource-proxy?path="));
    }

    #[test]
    fn test_unfinished_tag_released_on_finish() {
        let (out, count) = rewrite_in_writes(&[b"<p>x</p><script src=\"/WebResource.axd".as_slice()]);
        assert_eq!(count, 0);
        assert_eq!(out, "<p>x</p><script src=\"/WebResource.axd");
    }

    #[test]
    fn test_hold_point() {
        assert_eq!(hold_point(b"<p>hello</p>"), 12);
        assert_eq!(hold_point(b"abc<scr"), 3);
        assert_eq!(hold_point(b"abc<"), 3);
        assert_eq!(hold_point(b"abc<SCRIPT src=\"x"), 3);
        assert_eq!(hold_point(b"abc<style"), 9);
        assert_eq!(hold_point(b"abc<scripts"), 11);
        assert_eq!(hold_point(b"a < b"), 5);
        assert_eq!(hold_point(b"<a<scr"), 2);
        assert_eq!(hold_point(b"x<script data-x=\"a<b\" sr"), 1);
        assert_eq!(hold_point(b"<script title='>'>"), 18);
        assert_eq!(hold_point(b"<script title='>' src"), 0);
        assert_eq!(hold_point(b"<script a=\"<script \">tail"), 25);
    }

    #[test]
    fn test_lookback_is_bounded() {
        let mut tag = b"<script ".to_vec();
        tag.extend(std::iter::repeat(b'a').take(MAX_LOOKBACK + 1));
        assert_eq!(hold_point(&tag), tag.len());
    }

    #[test]
    fn test_flush_keeps_partial_tag() {
        let mut rewriter = ResourceRewriter::new(Vec::new(), context());
        rewriter.write_all(b"<p>a</p><scr").unwrap();
        rewriter.flush().unwrap();
        assert_eq!(rewriter.get_ref().as_slice(), b"<p>a</p>");

        rewriter
            .write_all(b"ipt src=\"/WebResource.axd?d=abc\"></script>")
            .unwrap();
        let out = rewriter.finish().unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("<p>a</p><script src=\"{PROXIED}\"></script>")
        );
    }

    #[test]
    fn test_unresolvable_origin() {
        let rules = RewriteRules::new("webresource.axd", "/", "resource-proxy").unwrap();
        assert!(rules.for_origin("not an origin").is_none());
    }
}
