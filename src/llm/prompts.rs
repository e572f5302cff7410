/// Selection guidance shared by every query prompt.
const SELECTOR_GUIDELINES: &[&str] = &[
    "Make the selector generic.",
    "Don't use class names or ids that look generated.",
    "Don't use hardcoded values.",
];

fn build_user_instructions_string(user_instructions: Option<&str>) -> Option<String> {
    let instructions = user_instructions?.trim();
    if instructions.is_empty() {
        return None;
    }

    Some(format!(
        "\n\n# Custom Instructions Provided by the User\n\nPlease keep the user's instructions in mind when choosing a selector. If the user's instructions are not relevant to the current query, ignore them.\n\nUser Instructions:\n{instructions}"
    ))
}

/// Prompt asking the model to pick one query function that selects `query`
/// inside the sanitized `html`.
pub fn build_selector_prompt(query: &str, html: &str, user_instructions: Option<&str>) -> String {
    let mut prompt = String::from(
        "Your goal is to write a function call that will select a requested element in a raw HTML.\n",
    );
    for guideline in SELECTOR_GUIDELINES {
        prompt.push_str(" - ");
        prompt.push_str(guideline);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        " The query is '{query}', the html is: ```html\n{html}\n```"
    ));

    if let Some(extra) = build_user_instructions_string(user_instructions) {
        prompt.push_str(&extra);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_prompt_embeds_query_and_html() {
        let prompt = build_selector_prompt("the author handle", "<a href=\"/x\">@x</a>", None);
        assert!(prompt.starts_with("Your goal is to write a function call"));
        assert!(prompt.contains(" - Don't use class names or ids that look generated.\n"));
        assert!(prompt.contains("The query is 'the author handle'"));
        assert!(prompt.ends_with("```html\n<a href=\"/x\">@x</a>\n```"));
    }

    #[test]
    fn blank_instructions_are_ignored() {
        let plain = build_selector_prompt("q", "<p></p>", None);
        assert_eq!(build_selector_prompt("q", "<p></p>", Some("   ")), plain);

        let guided = build_selector_prompt("q", "<p></p>", Some("Prefer data-testid attributes."));
        assert!(guided.starts_with(&plain));
        assert!(guided.ends_with("User Instructions:\nPrefer data-testid attributes."));
    }
}
