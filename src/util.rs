/// Builder style setter consuming and returning `Self`.
macro_rules! impl_setter {
    ($self:ident, $field:ident, $type:ty) => {
        pub fn $field(mut $self, $field: $type) -> Self {
            $self.$field = $field;
            $self
        }
    };
}

/// Cuts `msg` to at most `max` characters, respecting char boundaries.
pub fn truncate(msg: &str, max: usize) -> &str {
    match msg.char_indices().nth(max) {
        Some((idx, _)) => &msg[..idx],
        None => msg,
    }
}

/// Quotes `value` for `/bin/sh` unless it only contains characters that the
/// shell passes through unchanged.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_-./=:,+@%".contains(&b));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}
