// Business logic services

pub mod calendar_service;
pub mod error;
pub mod google_calendar;
pub mod ical;
pub mod notes_service;
pub mod permissions;
pub mod profiles_service;
pub mod recommendations_service;
pub mod web_push;

pub use calendar_service::CalendarService;
pub use error::ServiceError;
pub use google_calendar::{GoogleCalendarClient, GoogleSyncService, SyncError};
pub use ical::IcalExporter;
pub use notes_service::NotesService;
pub use permissions::CoachScope;
pub use profiles_service::ProfilesService;
pub use recommendations_service::RecommendationsService;
pub use web_push::{PushError, WebPushService};
