//! DOM selectors for the target forum (XenForo 2 markup).
//!
//! These are an implementation detail of the forum's current theme and must
//! be revalidated whenever its markup changes.

// Sign-in page
pub const LOGIN_NAME_FIELD: &str = r#"input[name="login"]"#;
pub const LOGIN_PASSWORD_FIELD: &str = r#"input[name="password"]"#;
pub const LOGIN_SUBMIT: &str = "button.button--primary";
pub const LOGIN_ERROR_BLOCK: &str = "div.block-body--error";

// Account state markers
pub const ACCOUNT_MENU: &str = "a.p-navgroup-link--user";
pub const LOGGED_OUT_MARKER: &str = r#"div.p-nav-opposite a[href*="/login/"]"#;
pub const LOGOUT_LINK_TEXT: &str = "Log out";

// Reply editor
pub const REPLY_EDITOR: &str = "div.fr-element.fr-view";
pub const REPLY_SUBMIT: &str = "button.button--primary.button--icon--reply";

// Thread tools menu
pub const THREAD_TOOLS_MENU: &str = r#"button.menuTrigger[title="More options"]"#;
pub const PIN_LINK_TEXT: &str = "Pin thread";
pub const UNPIN_LINK_TEXT: &str = "Unpin thread";
pub const CLOSE_LINK_TEXT: &str = "Close thread";

// Intake listing
pub const THREAD_LIST_CONTAINER: &str = "div.structItemContainer-group.js-threadList";
pub const THREAD_ITEM: &str = "div.structItem.structItem--thread.js-inlineModContainer";
pub const THREAD_TITLE_LINK: &str = "div.structItem-title > a";
pub const LOCKED_CLASS: &str = "is-locked";

// Topic page
pub const FIRST_POST_ARTICLE: &str = "article.message.message--post.js-post.js-inlineModContainer";
pub const POST_ARTICLE: &str = "article.message--post";
pub const POST_DATE: &str = "time.u-dt[datetime]";
pub const POST_TEXT: &str = "div.message-content.js-messageContent div.bbWrapper";
