const VOICE: &str = "alice";
const LANGUAGE: &str = "en-US";

/// Speak `text`, then reopen the mic; the next speech result posts to
/// `action_url`.
pub fn gather(text: &str, action_url: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response>\
         <Gather input=\"speech\" action=\"{}\" method=\"POST\" speechTimeout=\"auto\" language=\"{LANGUAGE}\">\
         <Say voice=\"{VOICE}\" language=\"{LANGUAGE}\">{}</Say>\
         </Gather>\
         </Response>",
        escape(action_url),
        escape(text),
    )
}

/// Speak `text` and end the call.
pub fn hangup(text: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response>\
         <Say voice=\"{VOICE}\" language=\"{LANGUAGE}\">{}</Say>\
         <Hangup/>\
         </Response>",
        escape(text),
    )
}

/// Empty response for status callbacks.
pub fn empty() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string()
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
