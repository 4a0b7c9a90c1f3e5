//! Prompt and comment builders for review generation.

/// Builds the single-shot review prompt.
///
/// Sections: role, PR title/description, retrieved context, unified diff,
/// then the requested answer layout.
pub fn build_review_prompt(
    title: &str,
    description: Option<&str>,
    context: &[String],
    diff: &str,
) -> String {
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("No description provided");

    let mut s = String::new();
    s.push_str("You are an expert code reviewer. Analyze the following pull request and provide a detailed, constructive code review.\n");
    s.push_str("\nPR Title: ");
    s.push_str(title);
    s.push_str("\nPR Description: ");
    s.push_str(description);
    s.push_str("\n\nContext from Codebase:\n");
    s.push_str(&context.join("\n\n"));
    s.push_str("\n\nCode Changes:\n```diff\n");
    s.push_str(diff);
    s.push_str("\n```\n");
    s.push_str("\nPlease provide:\n");
    s.push_str("1. **Walkthrough**: A file-by-file explanation of the changes.\n");
    s.push_str("2. **Sequence Diagram**: A Mermaid JS sequence diagram visualizing the flow of the changes (if applicable). Use a ```mermaid ... ``` block. Keep the syntax valid: no quotes, braces or parentheses inside Note text or labels. Keep the diagram simple.\n");
    s.push_str("3. **Summary**: Brief overview.\n");
    s.push_str("4. **Strengths**: What's done well.\n");
    s.push_str("5. **Issues**: Bugs, security concerns, code smells.\n");
    s.push_str("6. **Suggestions**: Specific code improvements.\n");
    s.push_str("7. **Poem**: A short, creative poem summarizing the changes at the very end.\n");
    s.push_str("\nFormat your response in markdown.");
    s
}

/// Wraps the model output for posting as a PR comment.
pub fn format_review_comment(review: &str) -> String {
    format!(
        "## AI Code Review\n\n{}\n\n---\n*Generated automatically from the pull request diff and repository context.*",
        review.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_all_inputs_in_order() {
        let ctx = vec!["File: a.rs\n\nfn a() {}".to_string(), "File: b.rs\n\nfn b() {}".to_string()];
        let p = build_review_prompt("Add cache", Some("Adds an LRU."), &ctx, "+let x = 1;");

        let title = p.find("PR Title: Add cache").unwrap();
        let context = p.find("File: a.rs\n\nfn a() {}\n\nFile: b.rs").unwrap();
        let diff = p.find("```diff\n+let x = 1;\n```").unwrap();
        let poem = p.find("**Poem**").unwrap();
        assert!(title < context && context < diff && diff < poem);
        assert!(p.contains("PR Description: Adds an LRU."));
    }

    #[test]
    fn missing_description_is_spelled_out() {
        let p = build_review_prompt("t", Some("   "), &[], "");
        assert!(p.contains("PR Description: No description provided"));
        let p = build_review_prompt("t", None, &[], "");
        assert!(p.contains("PR Description: No description provided"));
    }
}
