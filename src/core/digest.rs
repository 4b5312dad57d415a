use crate::models::ListingRecord;

/// `[source]`, then `name color price`, then the link.
pub fn format_notification_line(record: &ListingRecord) -> String {
    let details = [record.name(), record.color(), record.price()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    format!("[{}]\n{}\n{}", record.source(), details, record.link())
}

/// The text sent to every notifier for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub subject: String,
    pub lines: Vec<String>,
}

impl Digest {
    pub const SEPARATOR: &'static str = "\n\n";

    pub fn new(subject: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            lines,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn body(&self) -> String {
        self.lines.join(Self::SEPARATOR)
    }
}
