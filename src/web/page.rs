//! HTML rendering for the form page and the result fragments.

use crate::application::{HandlerFailure, ResultTable};
use crate::domain::{Area, EmployeeCount, Industry, Language};

const TITLE: &str = "Therapist Demand Predictive App";

const METHODOLOGY: &str = "This app uses a random forest model to predict service usage. \
The data for 'available slots' and 'patients per therapist' are obtained from company data.";

const STYLE: &str = "  <style>\n    body { font-family: ui-sans-serif, -apple-system, Segoe UI, Roboto, Arial, sans-serif; margin: 0; padding: 0 0 40px; background: #2c3e50; color: #ecf0f1; text-align: center; }\n    h1 { margin: 12px 0 5px; font-size: 1.8em; }\n    form { max-width: 500px; margin: auto; padding: 5px; }\n    .form-group { margin-bottom: 5px; text-align: left; }\n    .form-group label { display: block; margin-bottom: 2px; }\n    select, input { width: 100%; box-sizing: border-box; font-size: 1em; padding: 4px; }\n    input { text-align: center; }\n    button { font-size: 1em; margin: 10px; padding: 6px 24px; }\n    .loading { display: none; color: #119DFF; margin: 8px; }\n    .loading.active { display: block; }\n    #prediction-output { max-width: 500px; margin: auto; }\n    table { width: 100%; border-collapse: collapse; font-size: 0.9em; }\n    th { background: #696969; color: white; font-weight: bold; padding: 4px; }\n    td { background: #808080; color: white; padding: 4px; text-align: center; }\n    .error { border-left: 5px solid #ef4565; background: #34495e; padding: 8px; text-align: left; }\n    details { margin-top: 20px; font-size: 0.8em; }\n  </style>\n";

const SCRIPT: &str = r#"  <script>
    (function () {
      var form = document.getElementById('predict-form');
      var output = document.getElementById('prediction-output');
      var loading = document.getElementById('loading');
      var clicks = 0;
      form.addEventListener('submit', function (event) {
        event.preventDefault();
        clicks += 1;
        var body = new URLSearchParams(new FormData(form));
        body.set('n_clicks', String(clicks));
        loading.classList.add('active');
        fetch('predict', { method: 'POST', body: body, credentials: 'same-origin' })
          .then(function (response) {
            if (response.status === 204) { return null; }
            return response.text();
          })
          .then(function (html) { if (html !== null) { output.innerHTML = html; } })
          .catch(function (err) {
            output.innerHTML = '<div class="error">Request failed: ' + String(err).replace(/[<>&]/g, '') + '</div>';
          })
          .finally(function () { loading.classList.remove('active'); });
      });
    })();
  </script>
"#;

fn html_escape(value: &str) -> String {
    v_htmlescape::escape(value).to_string()
}

fn push_select(html: &mut String, id: &str, label: &str, options: &[&str], selected: &str) {
    html.push_str(&format!(
        "<div class=\"form-group\"><label for=\"{id}\">{}</label><select id=\"{id}\" name=\"{id}\">",
        html_escape(label)
    ));
    for option in options {
        let option = html_escape(option);
        let marker = if option == selected { " selected" } else { "" };
        html.push_str(&format!("<option value=\"{option}\"{marker}>{option}</option>"));
    }
    html.push_str("</select></div>\n");
}

/// The full page with the form, an empty output area and the methodology panel.
#[must_use]
pub fn render_index() -> String {
    let languages: Vec<&str> = Language::ALL.iter().map(Language::label).collect();
    let areas: Vec<&str> = Area::ALL.iter().map(Area::label).collect();
    let industries: Vec<&str> = Industry::ALL.iter().map(Industry::label).collect();

    let mut html = String::new();
    html.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"utf-8\">\n");
    html.push_str("  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("  <title>{}</title>\n", html_escape(TITLE)));
    html.push_str(STYLE);
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{} &#128200;</h1>\n", html_escape(TITLE)));

    html.push_str("<form id=\"predict-form\">\n");
    push_select(&mut html, "language", "Language", &languages, Language::English.label());
    push_select(&mut html, "area", "Area", &areas, Area::NorthAmerica.label());
    push_select(&mut html, "industry", "Industry", &industries, Industry::Technology.label());
    html.push_str(&format!(
        "<div class=\"form-group\"><label for=\"employee_count\">Number of Employees</label>\
<input id=\"employee_count\" name=\"employee_count\" type=\"number\" min=\"1\" step=\"1\" value=\"{}\"></div>\n",
        EmployeeCount::DEFAULT
    ));
    html.push_str("<button type=\"submit\" id=\"predict-button\">Predict</button>\n</form>\n");

    html.push_str("<div id=\"loading\" class=\"loading\">Loading&hellip;</div>\n");
    html.push_str("<div id=\"prediction-output\"></div>\n");
    html.push_str(&format!(
        "<details><summary>Methodology</summary><p>{}</p></details>\n",
        html_escape(METHODOLOGY)
    ));
    html.push_str(SCRIPT);
    html.push_str("</body>\n</html>\n");
    html
}

/// Two-column results table fragment.
#[must_use]
pub fn render_table(table: &ResultTable) -> String {
    let mut html = String::from("<table>\n<thead><tr><th>Metric</th><th>Value</th></tr></thead>\n<tbody>\n");
    for row in &table.rows {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            html_escape(&row.metric),
            html_escape(&row.value)
        ));
    }
    html.push_str("</tbody>\n</table>\n");
    html
}

/// Visible error fragment.
#[must_use]
pub fn render_failure(failure: &HandlerFailure) -> String {
    format!(
        "<div class=\"error\" data-kind=\"{}\"><strong>Could not compute the estimate.</strong><br>{}</div>\n",
        html_escape(failure.kind),
        html_escape(&failure.message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ResultRow;

    #[test]
    fn test_index_lists_vocabularies_with_defaults() {
        let html = render_index();
        for language in Language::ALL {
            assert!(html.contains(&format!("<option value=\"{}\"", language.label())));
        }
        assert!(html.contains("<option value=\"English\" selected>"));
        assert!(html.contains("<option value=\"North America\" selected>"));
        assert!(html.contains("<option value=\"Technology\" selected>"));
        assert!(html.contains("value=\"1000\""));
        assert!(html.contains("random forest model"));
    }

    #[test]
    fn test_fragments_escape_content() {
        let table = ResultTable {
            rows: vec![ResultRow {
                metric: "<script>".into(),
                value: "1 & 2".into(),
            }],
        };
        let html = render_table(&table);
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("1 &amp; 2"));

        let failure = HandlerFailure {
            kind: "encoding",
            message: "Unknown language \"<b>\"".into(),
        };
        let html = render_failure(&failure);
        assert!(html.contains("data-kind=\"encoding\""));
        assert!(!html.contains("<b>"));
    }
}
