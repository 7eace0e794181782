//! Book resource, draft and outbound payload models

use crate::tracker::error::ValidationError;
use crate::tracker::serialization::{deserialize_optional_date, deserialize_optional_rating};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reading status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BookStatus {
    #[default]
    #[serde(alias = "Quero Ler")]
    WantToRead,
    #[serde(alias = "Lendo")]
    Reading,
    #[serde(alias = "Lido")]
    Read,
}

impl BookStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WantToRead => "WantToRead",
            Self::Reading => "Reading",
            Self::Read => "Read",
        }
    }
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(&['-', '_', ' '][..], "").as_str() {
            "wanttoread" | "want" => Ok(Self::WantToRead),
            "reading" => Ok(Self::Reading),
            "read" | "done" => Ok(Self::Read),
            _ => Err(format!("unknown status: {s} (expected want-to-read, reading or read)")),
        }
    }
}

/// A book as the server returns it. The mirror stores these verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookResource {
    /// Server-assigned, immutable.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: BookStatus,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_rating",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating: Option<u8>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub completion_date: Option<NaiveDate>,
    pub owner_id: i64,
}

/// A user-edited, not yet persisted book.
///
/// Field defaults mirror an empty form: status `WantToRead`, rating 0
/// (unrated), empty text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BookDraft {
    /// Set when the draft was copied from an existing resource.
    pub id: Option<String>,
    pub title: String,
    pub author: String,
    pub description: String,
    pub status: BookStatus,
    pub rating: u8,
    pub completion_date: Option<NaiveDate>,
}

impl From<&BookResource> for BookDraft {
    fn from(book: &BookResource) -> Self {
        Self {
            id: Some(book.id.clone()),
            title: book.title.clone(),
            author: book.author.clone().unwrap_or_default(),
            description: book.description.clone().unwrap_or_default(),
            status: book.status,
            rating: book.rating.unwrap_or(0),
            completion_date: book.completion_date,
        }
    }
}

/// Options for [`BookDraft::shape`].
#[derive(Debug, Clone, Copy)]
pub struct ShapingOptions {
    /// Fill a missing completion date with `today` for read books.
    pub auto_stamp_completion: bool,
    pub today: NaiveDate,
}

impl ShapingOptions {
    pub fn new(auto_stamp_completion: bool) -> Self {
        Self {
            auto_stamp_completion,
            today: chrono::Local::now().date_naive(),
        }
    }
}

/// The only status a [`ReadPayload`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReadStatus {
    Read,
}

/// Statuses an [`UnreadPayload`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnreadStatus {
    WantToRead,
    Reading,
}

/// Outbound body for a finished book: rating and completion date required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPayload {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ReadStatus,
    pub rating: u8,
    pub completion_date: NaiveDate,
    pub owner_id: i64,
}

/// Outbound body for an unfinished book. Has no rating or completion-date
/// field at all, so neither key can reach the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadPayload {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: UnreadStatus,
    pub owner_id: i64,
}

/// Body of `POST /books` and `PUT /books/{id}`: a book without its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BookPayload {
    Read(ReadPayload),
    Unread(UnreadPayload),
}

impl BookPayload {
    pub fn title(&self) -> &str {
        match self {
            Self::Read(p) => &p.title,
            Self::Unread(p) => &p.title,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl BookDraft {
    /// Applies the shaping rule and produces the outbound payload.
    ///
    /// For any status other than `Read` the draft's rating and completion
    /// date are dropped, whatever they hold.
    pub fn shape(&self, owner_id: i64, options: &ShapingOptions) -> Result<BookPayload, ValidationError> {
        let title = non_empty(&self.title).ok_or(ValidationError::EmptyTitle)?;
        let author = non_empty(&self.author);
        let description = non_empty(&self.description);

        let status = match self.status {
            BookStatus::WantToRead => UnreadStatus::WantToRead,
            BookStatus::Reading => UnreadStatus::Reading,
            BookStatus::Read => {
                let rating = match self.rating {
                    0 => return Err(ValidationError::MissingRating),
                    r @ 1..=5 => r,
                    r => return Err(ValidationError::RatingOutOfRange(r)),
                };
                let completion_date = match self.completion_date {
                    Some(date) => date,
                    None if options.auto_stamp_completion => options.today,
                    None => return Err(ValidationError::MissingCompletionDate),
                };
                return Ok(BookPayload::Read(ReadPayload {
                    title,
                    author,
                    description,
                    status: ReadStatus::Read,
                    rating,
                    completion_date,
                    owner_id,
                }));
            }
        };

        Ok(BookPayload::Unread(UnreadPayload {
            title,
            author,
            description,
            status,
            owner_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn options(auto_stamp: bool) -> ShapingOptions {
        ShapingOptions {
            auto_stamp_completion: auto_stamp,
            today: date(2025, 3, 14),
        }
    }

    #[test]
    fn unread_payload_has_no_rating_or_completion_keys() {
        for status in [BookStatus::WantToRead, BookStatus::Reading] {
            let draft = BookDraft {
                title: "Dune".into(),
                status,
                rating: 4,
                completion_date: Some(date(2024, 1, 1)),
                ..Default::default()
            };
            let value = serde_json::to_value(draft.shape(7, &options(true)).unwrap()).unwrap();
            let obj = value.as_object().unwrap();
            assert!(!obj.contains_key("rating"));
            assert!(!obj.contains_key("completionDate"));
            assert_eq!(obj["status"], json!(status.as_str()));
            assert_eq!(obj["ownerId"], json!(7));
        }
    }

    #[test]
    fn read_payload_carries_rating_and_date() {
        let draft = BookDraft {
            title: "Foo".into(),
            author: "  ".into(),
            status: BookStatus::Read,
            rating: 4,
            completion_date: Some(date(2024, 1, 1)),
            ..Default::default()
        };
        let value = serde_json::to_value(draft.shape(7, &options(false)).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "title": "Foo",
                "status": "Read",
                "rating": 4,
                "completionDate": "2024-01-01",
                "ownerId": 7
            })
        );
    }

    #[test]
    fn read_without_date_is_stamped_only_when_enabled() {
        let draft = BookDraft {
            title: "Foo".into(),
            status: BookStatus::Read,
            rating: 5,
            ..Default::default()
        };
        assert_eq!(
            draft.shape(1, &options(false)),
            Err(ValidationError::MissingCompletionDate)
        );
        match draft.shape(1, &options(true)).unwrap() {
            BookPayload::Read(p) => assert_eq!(p.completion_date, date(2025, 3, 14)),
            other => panic!("expected read payload, got {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_bad_drafts() {
        let blank = BookDraft {
            title: "   ".into(),
            ..Default::default()
        };
        assert_eq!(blank.shape(1, &options(true)), Err(ValidationError::EmptyTitle));

        let mut read = BookDraft {
            title: "Foo".into(),
            status: BookStatus::Read,
            completion_date: Some(date(2024, 1, 1)),
            ..Default::default()
        };
        assert_eq!(read.shape(1, &options(true)), Err(ValidationError::MissingRating));
        read.rating = 6;
        assert_eq!(
            read.shape(1, &options(true)),
            Err(ValidationError::RatingOutOfRange(6))
        );
    }

    #[test]
    fn resource_decodes_legacy_shapes() {
        let book: BookResource = serde_json::from_value(json!({
            "id": "1",
            "title": "Dune",
            "status": "Lido",
            "rating": 4,
            "completionDate": "2024-01-01T12:00:00.000Z",
            "ownerId": 7
        }))
        .unwrap();
        assert_eq!(book.status, BookStatus::Read);
        assert_eq!(book.completion_date, Some(date(2024, 1, 1)));

        let book: BookResource = serde_json::from_value(json!({
            "id": "2",
            "title": "Emma",
            "status": "WantToRead",
            "rating": null,
            "completionDate": null,
            "ownerId": 7
        }))
        .unwrap();
        assert_eq!(book.rating, None);
        assert_eq!(book.completion_date, None);
        assert_eq!(book.author, None);
    }

    #[test]
    fn draft_from_resource_keeps_id() {
        let book = BookResource {
            id: "9".into(),
            title: "Foo".into(),
            author: Some("Bar".into()),
            description: None,
            status: BookStatus::Read,
            rating: Some(4),
            completion_date: Some(date(2024, 1, 1)),
            owner_id: 7,
        };
        let draft = BookDraft::from(&book);
        assert_eq!(draft.id.as_deref(), Some("9"));
        assert_eq!(draft.author, "Bar");
        assert_eq!(draft.rating, 4);
    }

    #[test]
    fn status_parses_cli_spellings() {
        assert_eq!("want-to-read".parse::<BookStatus>(), Ok(BookStatus::WantToRead));
        assert_eq!("Reading".parse::<BookStatus>(), Ok(BookStatus::Reading));
        assert_eq!("read".parse::<BookStatus>(), Ok(BookStatus::Read));
        assert!("finished?".parse::<BookStatus>().is_err());
    }
}
