//! One sync adapter per collection type.

pub mod components;
pub mod issue_histories;
pub mod issues;
pub mod labels;
pub mod projects;
pub mod reference;
pub mod users;
pub mod worklogs;

use crate::models::CollectionType;
use crate::services::adapter::CollectionSyncAdapter;
use crate::services::remote::Endpoint;

pub use components::ComponentsAdapter;
pub use issue_histories::IssueHistoriesAdapter;
pub use issues::IssuesAdapter;
pub use labels::LabelsAdapter;
pub use projects::ProjectsAdapter;
pub use reference::ReferenceAdapter;
pub use users::UsersAdapter;
pub use worklogs::WorklogsAdapter;

/// The adapter that fills `collection_type`.
pub fn adapter_for(collection_type: CollectionType) -> Box<dyn CollectionSyncAdapter> {
    match collection_type {
        CollectionType::Users => Box::new(UsersAdapter),
        CollectionType::Projects => Box::new(ProjectsAdapter),
        CollectionType::Components => Box::new(ComponentsAdapter),
        CollectionType::Issues => Box::new(IssuesAdapter),
        CollectionType::IssueHistories => Box::new(IssueHistoriesAdapter),
        CollectionType::Worklogs => Box::new(WorklogsAdapter),
        CollectionType::Labels => Box::new(LabelsAdapter),
        CollectionType::Statuses => Box::new(ReferenceAdapter::new(
            CollectionType::Statuses,
            Endpoint::Statuses,
        )),
        CollectionType::Priorities => Box::new(ReferenceAdapter::new(
            CollectionType::Priorities,
            Endpoint::Priorities,
        )),
        CollectionType::IssueTypes => Box::new(ReferenceAdapter::new(
            CollectionType::IssueTypes,
            Endpoint::IssueTypes,
        )),
        CollectionType::Resolutions => Box::new(ReferenceAdapter::new(
            CollectionType::Resolutions,
            Endpoint::Resolutions,
        )),
    }
}
