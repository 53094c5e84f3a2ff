// Export components
pub mod google_calendar;

// Re-export the calendar tools
pub use google_calendar::GoogleCalendar;
