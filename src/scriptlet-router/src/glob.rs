use regex::Regex;

/// Matches `name` against a trigger-binding pattern. `*` stands for any run of
/// characters (translated to `.*`); every other character is matched literally and the
/// whole pattern is anchored, so `orders.*` matches `orders.created` but not
/// `my.orders.created`.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    if pattern == "*" || pattern == name {
        return true;
    }
    let mut anchored = String::with_capacity(pattern.len() * 2 + 2);
    anchored.push('^');
    for part in pattern.split('*') {
        anchored.push_str(&regex::escape(part));
        anchored.push_str(".*");
    }
    for _ in 0..".*".len() {
        anchored.pop();
    }
    anchored.push('$');
    Regex::new(&anchored).map(|re| re.is_match(name)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::glob_match;

    #[test]
    fn exact_match() {
        assert!(glob_match("order.created", "order.created"));
        assert!(!glob_match("order.created", "order.updated"));
    }

    #[test]
    fn wildcard_matches_everything() {
        assert!(glob_match("*", "anything.at.all"));
    }

    #[test]
    fn suffix_wildcard_is_anchored_at_the_prefix() {
        assert!(glob_match("order.*", "order.created"));
        assert!(!glob_match("order.*", "my.order.created"));
    }

    #[test]
    fn literal_dots_are_not_treated_as_wildcards() {
        assert!(!glob_match("order.created", "orderXcreated"));
    }
}
