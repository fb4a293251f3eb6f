mod client;
mod oauth;

pub use client::{
    AboutInfo, ApiErrorClass, DriveClient, DriveError, DriveFile, DriveUser, FOLDER_MIME_TYPE,
    FileList, MediaDownload, StorageQuota, children_query, starred_folders_query,
};
pub use oauth::{DRIVE_READONLY_SCOPE, OAuthClient, OAuthError, OAuthToken};
