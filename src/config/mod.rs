pub mod settings;

// Re-export commonly used types
pub use settings::{
    AvatarSettings, AvatarSettingsHandle, NavigationSettings, WalkSettings, OutfitSettings,
    create_avatar_settings_handle, save_avatar_settings, load_avatar_settings,
    save_avatar_settings_to, load_avatar_settings_from,
};
