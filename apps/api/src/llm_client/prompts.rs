// Shared prompt fragments. Each feature that calls the LLM keeps its own
// prompts.rs next to it; only cross-cutting instructions live here.

/// Appended to every prompt that writes on the applicant's behalf.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every claim about the candidate must come from the resume above. \
    Do NOT invent employers, titles, dates, degrees or metrics. \
    If the resume does not support a claim, leave it out. \
    Do NOT claim familiarity with the company beyond what the posting states.";
