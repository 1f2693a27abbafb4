//! Page scripts for the shopping list, behind a replaceable strategy.
//!
//! Every script resolves to a JSON object with a `status` discriminator
//! ([`ScriptReply`]). Page churn only ever touches this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Builds the scripts the list adapter evaluates.
pub trait SelectorStrategy: Send + Sync {
    /// Script listing every row as `{name, completed}` in on-page order.
    fn read_script(&self) -> String;
    /// Script typing `name` into the add box and submitting it.
    fn add_script(&self, name: &str) -> String;
    /// Script deleting the first row whose normalized text matches `name`.
    fn remove_script(&self, name: &str) -> String;
}

/// One row as reported by the read script.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PageItem {
    /// Row text, trimmed.
    pub name: String,
    /// Whether the row's checkbox is ticked.
    #[serde(default)]
    pub completed: bool,
}

/// Reply shape shared by all list scripts.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScriptReply {
    /// Read succeeded.
    Ok {
        /// Rows in on-page order.
        #[serde(default)]
        items: Vec<PageItem>,
    },
    /// A sign-in or verification wall is shown.
    Login {
        /// Current page URL.
        #[serde(default)]
        url: String,
    },
    /// An expected element is absent.
    Missing {
        /// Which element.
        #[serde(default)]
        detail: String,
    },
    /// The add form was submitted.
    Submitted,
    /// The delete action was triggered.
    Removed,
    /// No row matched.
    Absent,
}

/// CSS selectors for the list page.
///
/// Comma-separated alternatives are allowed wherever a single element is
/// looked up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageSelectors {
    /// List container.
    pub list: String,
    /// One row inside the container.
    pub row: String,
    /// Row text element.
    pub title: String,
    /// Row completion checkbox.
    pub checkbox: String,
    /// "Add item" text input.
    pub input: String,
    /// "Add to list" button.
    pub button: String,
    /// Per-row delete button.
    pub delete: String,
    /// Any element that only exists on a sign-in wall.
    pub login: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            list: ".virtual-list".into(),
            row: "div.inner".into(),
            title: ".item-title, .item-name p".into(),
            checkbox: r#".checkBox input[type="checkbox"]"#.into(),
            input: r#".input-box input[type="text"]"#.into(),
            button: ".add-to-list button".into(),
            delete: r#".item-actions button[aria-label*="Delete"]"#.into(),
            login: r#"form[name="signIn"], input#ap_email, input#ap_password"#.into(),
        }
    }
}

/// Scripts for the Alexa shopping list page.
#[derive(Clone, Debug, Default)]
pub struct AmazonListSelectors {
    selectors: PageSelectors,
}

impl AmazonListSelectors {
    /// Strategy with custom selectors.
    pub fn new(selectors: PageSelectors) -> Self {
        Self { selectors }
    }

    /// Selectors in use.
    pub fn selectors(&self) -> &PageSelectors {
        &self.selectors
    }

    fn script(&self, body: &str, name: Option<&str>) -> String {
        let selectors = serde_json::to_string(&self.selectors).unwrap_or_else(|_| "{}".into());
        let name = Value::String(name.unwrap_or_default().to_string()).to_string();
        let body = body.replace("__NAME__", &name);
        format!("(async () => {{\nconst sel = {selectors};\n{PRELUDE}\n{body}\n}})()")
    }
}

impl SelectorStrategy for AmazonListSelectors {
    fn read_script(&self) -> String {
        self.script(READ_BODY, None)
    }

    fn add_script(&self, name: &str) -> String {
        self.script(ADD_BODY, Some(name))
    }

    fn remove_script(&self, name: &str) -> String {
        self.script(REMOVE_BODY, Some(name))
    }
}

// Same folding as `cartsync_core::normalize`. `rows()` is null when neither
// the list nor the add box rendered; an empty list may omit the container.
const PRELUDE: &str = r#"
const norm = (s) => (s || '').trim().replace(/\s+/g, ' ').toLowerCase();
const here = () => location.href;
const loginWall = () =>
  /\/ap\/(signin|mfa|cvf)/.test(location.pathname) || !!document.querySelector(sel.login);
const rows = () => {
  const list = document.querySelector(sel.list);
  if (!list) return document.querySelector(sel.input) ? [] : null;
  return Array.from(list.querySelectorAll(sel.row))
    .map((el) => {
      const title = el.querySelector(sel.title);
      const box = el.querySelector(sel.checkbox);
      return { el, name: title ? title.textContent.trim() : '', completed: box ? box.checked : false };
    })
    .filter((r) => r.name.length > 0);
};
"#;

const READ_BODY: &str = r#"
if (loginWall()) return { status: 'login', url: here() };
const found = rows();
if (found === null) return { status: 'missing', detail: 'list container ' + sel.list };
return { status: 'ok', items: found.map((r) => ({ name: r.name, completed: r.completed })) };
"#;

const ADD_BODY: &str = r#"
if (loginWall()) return { status: 'login', url: here() };
const name = __NAME__;
const input = document.querySelector(sel.input);
if (!input) return { status: 'missing', detail: 'add input ' + sel.input };
input.focus();
const setValue = Object.getOwnPropertyDescriptor(HTMLInputElement.prototype, 'value').set;
setValue.call(input, name);
input.dispatchEvent(new Event('input', { bubbles: true, cancelable: true }));
input.dispatchEvent(new Event('change', { bubbles: true, cancelable: true }));
const button = document.querySelector(sel.button) ||
  Array.from(document.querySelectorAll('button')).find((b) => norm(b.textContent).includes('add to list'));
if (!button) return { status: 'missing', detail: 'add button ' + sel.button };
for (let i = 0; i < 20 && button.disabled; i++) {
  await new Promise((r) => setTimeout(r, 100));
}
if (button.disabled) return { status: 'missing', detail: 'add button stayed disabled' };
button.click();
return { status: 'submitted' };
"#;

const REMOVE_BODY: &str = r#"
if (loginWall()) return { status: 'login', url: here() };
const key = norm(__NAME__);
const found = rows();
if (found === null) return { status: 'missing', detail: 'list container ' + sel.list };
const row = found.find((r) => !r.completed && norm(r.name) === key) ||
  found.find((r) => norm(r.name) === key);
if (!row) return { status: 'absent' };
const del = row.el.querySelector(sel.delete) ||
  Array.from(row.el.querySelectorAll('button')).find((b) =>
    norm(b.textContent + ' ' + (b.getAttribute('aria-label') || '')).includes('delete'));
if (!del) return { status: 'missing', detail: 'delete button ' + sel.delete };
del.click();
return { status: 'removed' };
"#;
