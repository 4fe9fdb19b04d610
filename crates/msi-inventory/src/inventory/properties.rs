//! Native property names.

/// Product properties readable through the product info functions.
pub mod product {
    pub const PRODUCT_NAME: &str = "ProductName";
    pub const INSTALLED_PRODUCT_NAME: &str = "InstalledProductName";
    pub const VERSION_STRING: &str = "VersionString";
    pub const INSTALL_DATE: &str = "InstallDate";
    pub const PUBLISHER: &str = "Publisher";
    pub const LOCAL_PACKAGE: &str = "LocalPackage";
    pub const INSTALL_LOCATION: &str = "InstallLocation";
    pub const INSTALL_SOURCE: &str = "InstallSource";
    pub const LANGUAGE: &str = "Language";
    pub const PACKAGE_CODE: &str = "PackageCode";
    pub const HELP_LINK: &str = "HelpLink";
    /// Extended API only.
    pub const STATE: &str = "State";
}

/// Patch properties readable through the patch info functions.
pub mod patch {
    pub const DISPLAY_NAME: &str = "DisplayName";
    pub const STATE: &str = "State";
    pub const UNINSTALLABLE: &str = "Uninstallable";
    pub const INSTALL_DATE: &str = "InstallDate";
    pub const LOCAL_PACKAGE: &str = "LocalPackage";
    pub const MORE_INFO_URL: &str = "MoreInfoURL";
    pub const TRANSFORMS: &str = "Transforms";
}
