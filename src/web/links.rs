//! HTML scanning for the order list and detail pages.
//!
//! Links are located with prioritized matchers: CSS selectors, or anchor text
//! for controls that only differ by label. Everything here is synchronous and
//! returns owned data, so no parsed document outlives the call.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static LISTING_RECEIPT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#".status-info__receipt-link, a[href^="javascript:postReceipt"]"#).unwrap()
});
static ORDER_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\d-]+$").unwrap());
static POST_RECEIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"postReceipt\(\s*['"]([^'"]+)['"]"#).unwrap());

/// Shortest dash-free id accepted as an order number.
const MIN_PLAIN_ID_LEN: usize = 15;

/// One way to recognize a link on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMatcher {
    /// Elements matching a CSS selector; the href is the element's own or its
    /// first descendant anchor's.
    Css(Cow<'static, str>),
    /// Anchors whose visible text contains the string.
    Text(Cow<'static, str>),
}

impl LinkMatcher {
    pub const fn css(selector: &'static str) -> Self {
        LinkMatcher::Css(Cow::Borrowed(selector))
    }

    pub const fn text(text: &'static str) -> Self {
        LinkMatcher::Text(Cow::Borrowed(text))
    }
}

pub const NEXT_PAGE_CANDIDATES: [LinkMatcher; 6] = [
    LinkMatcher::css(r#"a[rel~="next"]"#),
    LinkMatcher::text("次のページ"),
    LinkMatcher::text("次へ"),
    LinkMatcher::text("Next"),
    LinkMatcher::css(".pagination__next"),
    LinkMatcher::css("li.next a"),
];

pub const RECEIPT_CANDIDATES: [LinkMatcher; 5] = [
    LinkMatcher::css(r#"a[href^="javascript:postReceipt"]"#),
    LinkMatcher::css(".status-info__receipt-link"),
    LinkMatcher::css(r#"[data-testid="receipt-link"]"#),
    LinkMatcher::text("領収書"),
    LinkMatcher::css(r#"a[href*="receipt" i]"#),
];

/// Matchers that lead from the list to an order's detail page.
pub fn detail_candidates(id: &str) -> [LinkMatcher; 2] {
    [
        LinkMatcher::Css(format!(r#"a[href*="order_number={id}"]"#).into()),
        LinkMatcher::Css(format!(r#"a[href*="/detail/{id}"]"#).into()),
    ]
}

/// Hrefs of enabled elements picked by `matcher`, in document order.
fn enabled_hrefs(doc: &Html, matcher: &LinkMatcher) -> Vec<String> {
    let href_of = |el: ElementRef<'_>| if is_disabled(&el) { None } else { link_href(&el) };

    match matcher {
        LinkMatcher::Css(css) => match Selector::parse(css) {
            Ok(selector) => doc.select(&selector).filter_map(href_of).collect(),
            Err(e) => {
                tracing::warn!("Skipping unparsable link selector {css}: {e:?}");
                Vec::new()
            }
        },
        LinkMatcher::Text(text) => doc
            .select(&ANCHOR)
            .filter(|a| element_text(a).contains(&**text))
            .filter_map(href_of)
            .collect(),
    }
}

fn link_href(el: &ElementRef<'_>) -> Option<String> {
    el.value()
        .attr("href")
        .or_else(|| el.select(&ANCHOR).next().and_then(|a| a.value().attr("href")))
        .map(str::to_string)
}

fn is_disabled(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    value.attr("disabled").is_some()
        || value.attr("aria-disabled") == Some("true")
        || value.classes().any(|c| c.eq_ignore_ascii_case("disabled"))
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Order number carried by a listing link, if it looks like one.
///
/// Accepts `...?order_number=<id>` and `.../detail/<id>`; the id must be digits
/// and dashes, and a dash-free id must be at least 15 characters.
pub fn parse_order_id(href: &str, base: &Url) -> Option<String> {
    let url = base.join(href).ok()?;

    let id = if let Some((_, value)) = url.query_pairs().find(|(k, _)| k == "order_number") {
        value.into_owned()
    } else {
        let (_, rest) = url.path().split_once("/detail/")?;
        rest.split('/').next()?.to_string()
    };

    if id.is_empty() || !ORDER_ID_RE.is_match(&id) {
        return None;
    }
    if !id.contains('-') && id.len() < MIN_PLAIN_ID_LEN {
        return None;
    }
    Some(id)
}

/// Order ids on a list page, in document order, without duplicates.
pub fn extract_order_ids(body: &str, base: &Url) -> Vec<String> {
    let doc = Html::parse_document(body);
    let mut ids: Vec<String> = Vec::new();
    for anchor in doc.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if let Some(id) = parse_order_id(href, base)
            && !ids.contains(&id)
        {
            ids.push(id);
        }
    }
    ids
}

/// Next-page href for one candidate. In-page and script links do not count.
pub fn next_page_href(body: &str, matcher: &LinkMatcher) -> Option<String> {
    let doc = Html::parse_document(body);
    enabled_hrefs(&doc, matcher)
        .into_iter()
        .find(|href| !href.starts_with('#') && !href.starts_with("javascript:"))
}

pub fn detail_href(body: &str, matcher: &LinkMatcher) -> Option<String> {
    let doc = Html::parse_document(body);
    enabled_hrefs(&doc, matcher).into_iter().next()
}

/// Markup of the element whose `id` is the order number, if present.
pub fn order_block(body: &str, id: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"[id="{id}"]"#)).ok()?;
    let doc = Html::parse_document(body);
    doc.select(&selector).next().map(|el| el.html())
}

/// Whether an order's listing block carries its own receipt link.
pub fn has_listing_receipt_link(block: &str) -> bool {
    Html::parse_fragment(block)
        .select(&LISTING_RECEIPT)
        .next()
        .is_some()
}

/// Receipt link inside `scope`, resolved to something fetchable.
///
/// Script links of the form `javascript:postReceipt('<url>')` yield their
/// argument; other script links are not followable and are passed over.
pub fn receipt_href(scope: &str) -> Option<String> {
    let doc = Html::parse_document(scope);
    RECEIPT_CANDIDATES.iter().find_map(|matcher| {
        enabled_hrefs(&doc, matcher)
            .into_iter()
            .find_map(|href| followable(&href))
    })
}

fn followable(href: &str) -> Option<String> {
    if let Some(script) = href.strip_prefix("javascript:") {
        return POST_RECEIPT_RE.captures(script).map(|cap| cap[1].to_string());
    }
    Some(href.to_string())
}
