use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use super::history::ChartRow;

#[derive(Error, Debug, PartialEq)]
pub enum PageError {
    #[error("page has no chart date element")]
    MissingDate,
}

/// Everything read off one weekly chart page.
#[derive(Debug, PartialEq)]
pub struct ChartPage {
    pub week_start: String,
    pub rows: Vec<ChartRow>,
    /// Raw href of the "prev" link, if the page has one.
    pub prev_href: Option<String>,
}

static DATE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p.article-date").unwrap());
static POSITION_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.position").unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.title").unwrap());
static ARTIST_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.artist").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Parse a chart page: the week date, one row per listed position, and the
/// link to the previous week.
pub fn parse_page(html: &str) -> Result<ChartPage, PageError> {
    let doc = Html::parse_document(html);

    // "02 January 1975 - 08 January 1975" → "02 January 1975"
    let date_text = doc
        .select(&DATE_SEL)
        .next()
        .map(element_text)
        .ok_or(PageError::MissingDate)?;
    let week_start = date_text
        .split('-')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    let positions: Vec<String> = doc.select(&POSITION_SEL).map(element_text).collect();
    let titles: Vec<String> = doc.select(&TITLE_SEL).map(element_text).collect();
    let artists: Vec<String> = doc.select(&ARTIST_SEL).map(element_text).collect();

    if titles.len() != positions.len() || artists.len() != positions.len() {
        log::warn!(
            "{week_start}: {} positions, {} titles, {} artists; extra entries ignored",
            positions.len(),
            titles.len(),
            artists.len()
        );
    }

    let mut rows = Vec::with_capacity(positions.len());
    for (i, pos) in positions.iter().enumerate() {
        let (Some(title), Some(artist)) = (titles.get(i), artists.get(i)) else {
            break;
        };
        match pos.parse::<i32>() {
            Ok(chart_position) => rows.push(ChartRow {
                week_start: week_start.clone(),
                chart_position,
                artist: artist.clone(),
                title: title.clone(),
            }),
            Err(_) => log::warn!("{week_start}: skipping non-numeric position {pos:?}"),
        }
    }

    let prev_href = doc
        .select(&LINK_SEL)
        .find(|a| element_text(*a).eq_ignore_ascii_case("prev"))
        .and_then(|a| a.value().attr("href"))
        .map(|h| h.to_string());

    Ok(ChartPage {
        week_start,
        rows,
        prev_href,
    })
}

#[cfg(test)]
pub(crate) fn sample_page(date: &str, entries: &[(i32, &str, &str)], prev: Option<&str>) -> String {
    let mut html = String::from("<html><body>");
    html.push_str(&format!(
        "<p class=\"article-date\">\r\n {date} - later\r\n</p><table>"
    ));
    for (pos, artist, title) in entries {
        html.push_str(&format!(
            "<tr><td><span class=\"position\">{pos}</span></td>\
             <td><div class=\"title\">\n<a href=\"#\">{title}</a>\n</div>\
             <div class=\"artist\">\n<a href=\"#\">{artist}</a>\n</div></td></tr>"
        ));
    }
    html.push_str("</table><nav>");
    if let Some(href) = prev {
        html.push_str(&format!("<a href=\"{href}\">prev</a>"));
    }
    html.push_str("<a href=\"/charts/next\">next</a></nav></body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows_and_date() {
        let html = sample_page(
            "02 January 1975",
            &[(1, "MUD", "LONELY THIS CHRISTMAS"), (2, "WOMBLES", "WOMBLING MERRY CHRISTMAS")],
            Some("/charts/singles-chart/19741226/7501/"),
        );
        let page = parse_page(&html).unwrap();
        assert_eq!(page.week_start, "02 January 1975");
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0].chart_position, 1);
        assert_eq!(page.rows[0].artist, "MUD");
        assert_eq!(page.rows[1].title, "WOMBLING MERRY CHRISTMAS");
        assert!(page.rows.iter().all(|r| r.week_start == "02 January 1975"));
        assert_eq!(page.prev_href.as_deref(), Some("/charts/singles-chart/19741226/7501/"));
    }

    #[test]
    fn test_no_prev_link() {
        let html = sample_page("14 November 1952", &[(1, "AL MARTINO", "HERE IN MY HEART")], None);
        let page = parse_page(&html).unwrap();
        assert_eq!(page.rows.len(), 1);
        assert!(page.prev_href.is_none());
    }

    #[test]
    fn test_missing_date() {
        let html = "<html><body><span class=\"position\">1</span></body></html>";
        assert_eq!(parse_page(html), Err(PageError::MissingDate));
    }

    #[test]
    fn test_non_numeric_position_skipped() {
        let html = sample_page("1 May 1980", &[(1, "A", "B")], None)
            .replace("<span class=\"position\">1</span>", "<span class=\"position\">NEW</span>");
        let page = parse_page(&html).unwrap();
        assert!(page.rows.is_empty());
    }
}
