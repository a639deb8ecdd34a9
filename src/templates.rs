//! Canned reply rendering.
//!
//! Templates are plain text with seven fixed placeholder tokens. Rendering is
//! literal substring replacement, nothing more — callers must ensure user
//! content cannot collide with the placeholder syntax.
//!
//! | token | value                         |
//! |-------|-------------------------------|
//! | data0 | today's date (`%d.%m.%Y`)     |
//! | data1 | applicant name                |
//! | data2 | officer name                  |
//! | data3 | judge nickname                |
//! | data4 | free text (custom replies)    |
//! | data5 | case docket number            |
//! | data6 | next expected docket number   |

use chrono::NaiveDate;

/// Values substituted into a reply template. Absent fields render as bracket
/// placeholders so a half-filled template is visible on the forum instead of
/// silently blank.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub applicant: Option<String>,
    pub officer: Option<String>,
    pub judge: Option<String>,
    pub custom_text: Option<String>,
    pub case_num: Option<String>,
    pub next_case_num: Option<String>,
}

pub fn render(template: &str, today: NaiveDate, ctx: &RenderContext) -> String {
    let date = today.format("%d.%m.%Y").to_string();
    let replacements: [(&str, &str); 7] = [
        ("data0", &date),
        ("data1", ctx.applicant.as_deref().unwrap_or("[applicant]")),
        ("data2", ctx.officer.as_deref().unwrap_or("[officer]")),
        ("data3", ctx.judge.as_deref().unwrap_or("[judge]")),
        ("data4", ctx.custom_text.as_deref().unwrap_or("[reply]")),
        ("data5", ctx.case_num.as_deref().unwrap_or("[case number]")),
        ("data6", ctx.next_case_num.as_deref().unwrap_or("")),
    ];

    let mut rendered = template.to_string();
    for (token, value) in replacements {
        rendered = rendered.replace(token, value);
    }
    rendered
}
