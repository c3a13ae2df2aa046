// LLM prompt constants for cover-letter generation.

use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::models::application::Resume;
use crate::models::candidate::JobCandidate;

/// System prompt for cover letters — plain text, no markdown.
pub const COVER_LETTER_SYSTEM: &str = "You write concise, specific cover letters for job \
    applications. Respond with the letter body only, in plain text. \
    Do NOT use markdown. Do NOT include placeholders such as [Company].";

/// Cover letter template. Replace `{title}`, `{company}`, `{location}`,
/// `{resume}`, `{name}` and `{grounding}` before sending.
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a cover letter for the position below.

Position: {title}
Company: {company}
Location: {location}

Candidate name: {name}

Candidate resume:
---
{resume}
---

Keep it under 250 words, three short paragraphs, signed with the candidate's name.

{grounding}"#;

pub fn build_cover_letter_prompt(job: &JobCandidate, resume: &Resume) -> String {
    COVER_LETTER_PROMPT_TEMPLATE
        .replace("{title}", &job.title)
        .replace("{company}", &job.company)
        .replace("{location}", job.location.as_deref().unwrap_or("not specified"))
        .replace("{name}", &resume.full_name)
        .replace("{resume}", &resume.content)
        .replace("{grounding}", GROUNDING_INSTRUCTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_prompt_has_no_unfilled_placeholders() {
        let job = JobCandidate {
            platform: "lever".to_string(),
            title: "Platform Engineer".to_string(),
            company: "Globex".to_string(),
            url: "https://jobs.lever.co/globex/1".to_string(),
            posted_date: None,
            location: None,
            salary_min: None,
            salary_max: None,
            contact_email: None,
            external_id: None,
        };
        let resume = Resume {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Default".to_string(),
            content: "Ten years of Rust.".to_string(),
            full_name: "Sam Doe".to_string(),
            email: "sam@example.com".to_string(),
            phone: None,
        };
        let prompt = build_cover_letter_prompt(&job, &resume);
        assert!(prompt.contains("Platform Engineer"));
        assert!(prompt.contains("Ten years of Rust."));
        assert!(prompt.contains("not specified"));
        assert!(!prompt.contains("{resume}"));
        assert!(!prompt.contains("{grounding}"));
    }
}
