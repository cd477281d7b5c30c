use std::io::Cursor;

/// Elements whose text never counts as page content.
const STRIPPED_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "nav", "footer", "header",
];

/// Convert HTML to readable plain text.
///
/// Used for markup-only crawl rows; callers apply their own output bounds.
pub fn html_to_text(html: &str, width: usize) -> String {
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

pub fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadablePage {
    pub title: Option<String>,
    /// One normalized line per text run, boilerplate regions removed.
    pub text: String,
}

/// Title plus whitespace-normalized body text of an HTML page.
pub fn readable_page(html: &str) -> ReadablePage {
    let doc = html_scraper::Html::parse_document(html);

    let title = html_scraper::Selector::parse("title")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .map(|el| norm_ws(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let mut lines: Vec<String> = Vec::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let stripped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| STRIPPED_ELEMENTS.contains(&e.name()))
        });
        if stripped {
            continue;
        }
        let text: &str = text;
        for line in text.lines() {
            let line = norm_ws(line);
            if !line.is_empty() {
                lines.push(line);
            }
        }
    }

    ReadablePage {
        title,
        text: lines.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_from_simple_html() {
        let html = r#"<html><body><h1>Hello</h1><p>world</p></body></html>"#;
        let out = html_to_text(html, 80);
        assert!(out.contains("Hello"));
        assert!(out.contains("world"));
    }

    #[test]
    fn readable_page_strips_boilerplate_regions() {
        let html = r#"
        <html>
          <head><title>  Inflation
             explained </title><style>body { color: red }</style></head>
          <body>
            <header>Site Header</header>
            <nav><a href="/">Home</a></nav>
            <script>var tracking = 1;</script>
            <main>
              <h1>What is inflation?</h1>
              <p>Inflation   is the rate
                 at which prices rise.</p>
            </main>
            <footer>Copyright</footer>
          </body>
        </html>"#;
        let page = readable_page(html);
        assert_eq!(page.title.as_deref(), Some("Inflation explained"));
        assert_eq!(
            page.text,
            "What is inflation?\nInflation is the rate\nat which prices rise."
        );
        for gone in ["Site Header", "Home", "tracking", "Copyright", "color: red"] {
            assert!(!page.text.contains(gone), "{gone} leaked into {:?}", page.text);
        }
    }

    #[test]
    fn readable_page_without_title() {
        let page = readable_page("<p>just text</p>");
        assert_eq!(page.title, None);
        assert_eq!(page.text, "just text");
    }
}
