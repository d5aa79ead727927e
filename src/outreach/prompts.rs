//! Fixed texts the coordinator sends without asking the model.

use crate::outreach::model::UserType;

/// Interim acknowledgment while a verification runs.
pub const CHECKING: &str = "Thanks! Give me a moment while I check this...";

pub const PROFILE_CONFIRMED: &str =
    "Got it, that profile is yours. I've added it to what I know about you.";

pub const PROFILE_REJECTED: &str = "I couldn't confirm that this profile belongs to you. \
If it is yours, make sure the name on it matches the one you gave me and try again.";

pub const PORTFOLIO_CONFIRMED: &str = "Thanks, your portfolio is saved to your profile.";

pub const PORTFOLIO_REJECTED: &str = "I couldn't tie that link to you. \
Please share a portfolio page that shows your name.";

pub const RESUME_CONFIRMED: &str = "Your resume is in. I'll use it when matching you to opportunities.";

pub const RESUME_REJECTED: &str = "That document doesn't look like a resume or CV to me. \
Please send one that includes your contact details and experience.";

pub const DOCUMENT_UNREADABLE: &str =
    "I couldn't read that file. A plain-text copy of your resume works best.";

/// Seeded as a user turn after a successful verification.
pub const WHATS_NEXT: &str = "What's next?";

/// Reply when the model is unavailable after retries.
pub const TRY_LATER: &str =
    "I'm having trouble thinking right now. Please try again in a few minutes.";

/// Framing for a user who has talked to the bot before.
pub const HAVE_UPDATES: &str = "Hi again! I have some updates for you.";

/// Framing for someone the bot is contacting for the first time.
pub const SAVE_CONTACT: &str = "Hi! I'm a recruiting assistant. \
Please save this number so you don't miss opportunities I send your way.";

pub const NEEDS_TYPE: &str = "Before we continue, tell me whether you're looking for work \
(as a candidate or freelancer) or looking to hire (as HR or a client).";

pub const REACH_OUTS_SENT: &str = "I've sent you the opportunities I was holding for you.";

/// Notice sent once a session-end request has been handled.
pub fn session_changed(user_type: UserType) -> String {
    match user_type {
        UserType::Candidate => "You're set up as a candidate. Send me your resume whenever you like.".to_string(),
        UserType::Freelancer => "You're set up as a freelancer. Share your portfolio link whenever you like.".to_string(),
        UserType::Client | UserType::Hr => "You're set up to hire. Tell me who you're looking for.".to_string(),
        UserType::Idol => "Thanks, that's all wrapped up.".to_string(),
        other => format!("Your session was updated ({other})."),
    }
}

/// Prompt for an engaged user: their message framed by the opportunity
/// they are negotiating.
pub fn engaged_prompt(author_name: &str, opportunity: &str, content: &str) -> String {
    format!(
        "You are talking to this person on behalf of {author_name} about the following \
opportunity:\n{opportunity}\n\nFind out whether they are interested and a good fit. \
When that is clear, call end_session.\n\nTheir message: {content}"
    )
}
