use std::sync::Arc;

use crate::auto_apply::providers::{EmailAttachment, EmailSender, ProviderError};
use crate::auto_apply::submit::{AttemptRequest, Failure};
use crate::models::application::Resume;
use crate::models::candidate::JobCandidate;

/// Applies by mailing the posting's contact address.
pub struct EmailSubmit {
    sender: Arc<dyn EmailSender>,
}

/// A ready-to-send application email.
#[derive(Debug, Clone)]
pub struct ApplicationEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<EmailAttachment>,
}

impl EmailSubmit {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }

    pub async fn submit(&self, request: &AttemptRequest<'_>) -> Result<(), Failure> {
        let email = compose(request.candidate, request.resume, request.cover_letter)?;

        match self
            .sender
            .send(&email.to, &email.subject, &email.body, &email.attachments)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(Failure::transient(format!(
                "email provider refused message to {}",
                email.to
            ))),
            Err(ProviderError::NotConfigured(m)) => Err(Failure::structural(m)),
            Err(e) => Err(Failure::transient(e.to_string())),
        }
    }
}

pub fn compose(
    job: &JobCandidate,
    resume: &Resume,
    cover_letter: Option<&str>,
) -> Result<ApplicationEmail, Failure> {
    let to = job
        .contact_email
        .as_deref()
        .map(str::trim)
        .filter(|e| e.contains('@'))
        .ok_or_else(|| Failure::structural("posting has no contact email"))?;

    let mut body = match cover_letter {
        Some(letter) => letter.trim().to_string(),
        None => format!(
            "Hello,\n\nI would like to apply for the {} position at {}. My resume is attached.",
            job.title, job.company
        ),
    };
    body.push_str(&format!("\n\nPosting: {}\n\n{}\n{}", job.url, resume.full_name, resume.email));
    if let Some(phone) = &resume.phone {
        body.push('\n');
        body.push_str(phone);
    }

    Ok(ApplicationEmail {
        to: to.to_string(),
        subject: format!("Application: {} at {}", job.title, job.company),
        body,
        attachments: vec![EmailAttachment {
            filename: format!("{}-resume.txt", slug(&resume.full_name)),
            content_type: "text/plain".to_string(),
            content: resume.content.clone(),
        }],
    })
}

fn slug(name: &str) -> String {
    let s: String = name
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-");
    if s.is_empty() {
        "applicant".to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auto_apply::submit::AttemptError;
    use crate::auto_apply::testing::{candidate, resume, FakeEmail};
    use uuid::Uuid;

    #[test]
    fn test_compose_email() {
        let job = candidate("email", "Platform Engineer", "Globex");
        let resume = resume(Uuid::new_v4());
        let email = compose(&job, &resume, Some("Dear Globex team")).unwrap();

        assert_eq!(email.to, "jobs@globex.example.com");
        assert_eq!(email.subject, "Application: Platform Engineer at Globex");
        assert!(email.body.starts_with("Dear Globex team"));
        assert!(email.body.contains(&job.url));
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].filename, "sam-doe-resume.txt");
    }

    #[test]
    fn test_missing_contact_is_structural() {
        let mut job = candidate("email", "Platform Engineer", "Globex");
        job.contact_email = None;
        let err = compose(&job, &resume(Uuid::new_v4()), None).unwrap_err();
        assert!(matches!(err.error, AttemptError::Structural(_)));
    }

    #[tokio::test]
    async fn test_submit_sends_once() {
        let sender = Arc::new(FakeEmail::default());
        let submit = EmailSubmit::new(sender.clone());
        let job = candidate("email", "Platform Engineer", "Globex");
        let resume = resume(Uuid::new_v4());

        submit
            .submit(&AttemptRequest {
                candidate: &job,
                resume: &resume,
                cover_letter: None,
            })
            .await
            .unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].attachments, 1);
        assert!(sent[0].body.contains("Platform Engineer position at Globex"));
    }
}
