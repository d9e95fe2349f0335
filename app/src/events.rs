use std::cmp::Ordering;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use log::*;
use r2d2::Pool;
use serde::{Deserialize, Serialize};
use url::Url;

use infra::ids::{Entity, Id, IdGen};
use infra::persistence::Storage;
use infra::records::{Filter, Record};

use crate::errors::{CmsError, StorageResultExt};
use crate::services::{optional_text, require_text, Commandable, Queryable, Request, Validate};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Event {
    pub id: Id<Event>,
    pub title: String,
    pub description: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EventForm {
    pub title: String,
    pub description: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_published: bool,
}

impl Entity for Event {
    const PREFIX: &'static str = "event";
}

impl Record for Event {
    const TABLE: &'static str = "events";
    fn id(&self) -> Id<Self> {
        self.id
    }
}

impl Event {
    fn new(id: Id<Event>, form: &EventForm, now: DateTime<Utc>) -> Self {
        Event {
            id,
            title: form.title.trim().to_string(),
            description: optional_text(&form.description),
            event_date: form.event_date,
            location: optional_text(&form.location),
            image_url: optional_text(&form.image_url),
            is_published: form.is_published,
            created_at: now,
            updated_at: None,
        }
    }

    fn apply(&mut self, form: &EventForm, now: DateTime<Utc>) {
        self.title = form.title.trim().to_string();
        self.description = optional_text(&form.description);
        self.event_date = form.event_date;
        self.location = optional_text(&form.location);
        self.image_url = optional_text(&form.image_url);
        self.is_published = form.is_published;
        self.updated_at = Some(now);
    }
}

impl Validate for EventForm {
    fn validate(&self) -> Result<(), CmsError> {
        require_text("Title", &self.title)?;
        if let Some(image_url) = optional_text(&self.image_url) {
            Url::parse(&image_url).map_err(|e| {
                CmsError::validation(format!("Image URL {:?} is not valid: {}", image_url, e))
            })?;
        }
        Ok(())
    }
}

/// Newest event date first; undated events last, newest created first.
fn portfolio_order(a: &Event, b: &Event) -> Ordering {
    match (a.event_date, b.event_date) {
        (Some(a_date), Some(b_date)) => b_date.cmp(&a_date),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(b.created_at.cmp(&a.created_at))
}

#[derive(Debug)]
pub struct Events<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: IdGen,
}

#[derive(Debug, Clone, Default)]
pub struct ListEvents {
    pub published_only: bool,
}

#[derive(Debug, Clone)]
pub struct GetEvent(pub Id<Event>);

#[derive(Debug, Clone)]
pub struct CreateEvent(pub EventForm);

#[derive(Debug, Clone)]
pub struct UpdateEvent {
    pub id: Id<Event>,
    pub form: EventForm,
}

#[derive(Debug, Clone)]
pub struct SetEventPublished {
    pub id: Id<Event>,
    pub published: bool,
}

#[derive(Debug, Clone)]
pub struct DeleteEvent(pub Id<Event>);

impl Request for ListEvents {
    type Resp = Vec<Event>;
}
impl Request for GetEvent {
    type Resp = Option<Event>;
}
impl Request for CreateEvent {
    type Resp = Event;
}
impl Request for UpdateEvent {
    type Resp = Event;
}
impl Request for SetEventPublished {
    type Resp = Event;
}
impl Request for DeleteEvent {
    type Resp = ();
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Events<M> {
    pub fn new(db: Pool<M>, idgen: IdGen) -> Self {
        Events { db, idgen }
    }

    fn load_existing(&self, docs: &D, id: &Id<Event>) -> Result<Event> {
        let event = docs
            .load(id)
            .translated()?
            .ok_or_else(|| CmsError::not_found(id))?;
        Ok(event)
    }
}

impl<M: r2d2::ManageConnection> Clone for Events<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let idgen = self.idgen.clone();
        Events { db, idgen }
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ListEvents> for Events<M>
{
    fn query(&self, req: ListEvents) -> Result<Vec<Event>> {
        let mut filter = Filter::all();
        if req.published_only {
            filter = filter.eq("is_published", true);
        }
        let mut events = self.db.get()?.select::<Event>(&filter).translated()?;
        events.sort_by(portfolio_order);
        Ok(events)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<GetEvent> for Events<M>
{
    fn query(&self, GetEvent(id): GetEvent) -> Result<Option<Event>> {
        self.db.get()?.load(&id).translated()
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<CreateEvent> for Events<M>
{
    fn execute(&self, CreateEvent(form): CreateEvent) -> Result<Event> {
        form.validate()?;
        let event = Event::new(self.idgen.generate(), &form, Utc::now());
        let event = self.db.get()?.insert(&event).translated()?;
        info!("Created event {}: {}", event.id, event.title);
        Ok(event)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdateEvent> for Events<M>
{
    fn execute(&self, req: UpdateEvent) -> Result<Event> {
        req.form.validate()?;
        let docs = self.db.get()?;
        let mut event = self.load_existing(&docs, &req.id)?;
        event.apply(&req.form, Utc::now());
        let event = docs.update(&event).translated()?;
        debug!("Updated event {:?}", event);
        Ok(event)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<SetEventPublished> for Events<M>
{
    fn execute(&self, req: SetEventPublished) -> Result<Event> {
        let docs = self.db.get()?;
        let mut event = self.load_existing(&docs, &req.id)?;
        event.is_published = req.published;
        event.updated_at = Some(Utc::now());
        let event = docs.update(&event).translated()?;
        info!("Event {} published: {}", event.id, event.is_published);
        Ok(event)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<DeleteEvent> for Events<M>
{
    fn execute(&self, DeleteEvent(id): DeleteEvent) -> Result<()> {
        self.db.get()?.delete(&id).translated()?;
        info!("Deleted event {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn form(title: &str) -> EventForm {
        EventForm {
            title: title.to_string(),
            description: None,
            event_date: None,
            location: None,
            image_url: None,
            is_published: false,
        }
    }

    fn event(idgen: &IdGen, title: &str, date: Option<(i32, u32, u32)>) -> Event {
        let form = EventForm {
            event_date: date.map(|(y, m, d)| NaiveDate::from_ymd(y, m, d)),
            ..form(title)
        };
        Event::new(idgen.generate(), &form, Utc::now())
    }

    #[test]
    fn image_url_must_be_absolute() {
        let relative = EventForm {
            image_url: Some("/uploads/launch.jpg".to_string()),
            ..form("Launch")
        };
        let absolute = EventForm {
            image_url: Some("https://cdn.example.com/launch.jpg".to_string()),
            ..form("Launch")
        };
        let blank = EventForm {
            image_url: Some("  ".to_string()),
            ..form("Launch")
        };

        assert!(relative.validate().is_err());
        assert_eq!(absolute.validate(), Ok(()));
        assert_eq!(blank.validate(), Ok(()));
    }

    #[test]
    fn title_is_required() {
        assert_eq!(
            form(" ").validate(),
            Err(CmsError::Validation("Title is required".to_string()))
        );
    }

    #[test]
    fn newest_dates_first_and_undated_last() {
        let idgen = IdGen::new();
        let mut events = vec![
            event(&idgen, "Undated", None),
            event(&idgen, "Spring", Some((2020, 3, 1))),
            event(&idgen, "Summer", Some((2020, 7, 1))),
        ];

        events.sort_by(portfolio_order);

        let titles = events.iter().map(|e| e.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["Summer", "Spring", "Undated"]);
    }
}
