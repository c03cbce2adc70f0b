//! Key definitions for page-level keyboard presses
//!
//! CDP `Input.dispatchKeyEvent` needs the DOM key name, the physical code and
//! the Windows virtual key code to produce events sites actually react to.

pub(crate) struct KeyDefinition {
    pub key: &'static str,
    pub code: &'static str,
    pub key_code: i64,
    /// Text emitted on keydown, for keys that produce input
    pub text: Option<&'static str>,
}

pub(crate) fn lookup(name: &str) -> Option<KeyDefinition> {
    let def = match name {
        "Enter" => KeyDefinition {
            key: "Enter",
            code: "Enter",
            key_code: 13,
            text: Some("\r"),
        },
        "Tab" => KeyDefinition {
            key: "Tab",
            code: "Tab",
            key_code: 9,
            text: None,
        },
        "Escape" => KeyDefinition {
            key: "Escape",
            code: "Escape",
            key_code: 27,
            text: None,
        },
        "Backspace" => KeyDefinition {
            key: "Backspace",
            code: "Backspace",
            key_code: 8,
            text: None,
        },
        "Delete" => KeyDefinition {
            key: "Delete",
            code: "Delete",
            key_code: 46,
            text: None,
        },
        "Space" | " " => KeyDefinition {
            key: " ",
            code: "Space",
            key_code: 32,
            text: Some(" "),
        },
        "ArrowUp" => KeyDefinition {
            key: "ArrowUp",
            code: "ArrowUp",
            key_code: 38,
            text: None,
        },
        "ArrowDown" => KeyDefinition {
            key: "ArrowDown",
            code: "ArrowDown",
            key_code: 40,
            text: None,
        },
        "ArrowLeft" => KeyDefinition {
            key: "ArrowLeft",
            code: "ArrowLeft",
            key_code: 37,
            text: None,
        },
        "ArrowRight" => KeyDefinition {
            key: "ArrowRight",
            code: "ArrowRight",
            key_code: 39,
            text: None,
        },
        "Home" => KeyDefinition {
            key: "Home",
            code: "Home",
            key_code: 36,
            text: None,
        },
        "End" => KeyDefinition {
            key: "End",
            code: "End",
            key_code: 35,
            text: None,
        },
        "PageUp" => KeyDefinition {
            key: "PageUp",
            code: "PageUp",
            key_code: 33,
            text: None,
        },
        "PageDown" => KeyDefinition {
            key: "PageDown",
            code: "PageDown",
            key_code: 34,
            text: None,
        },
        _ => return None,
    };
    Some(def)
}
