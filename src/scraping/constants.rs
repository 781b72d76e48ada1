// thirtyfour (selenium) inputs
pub const WINDOW_WIDTH: u32 = 1280;
pub const WINDOW_HEIGHT: u32 = 775;

// HTML selectors for the host datatable
pub const ROW_SELECTOR: &str = "tr.kt-datatable__row";
pub const NAME_FIELD_SELECTOR: &str = "[data-field=\"name\"]";
pub const STREET_SELECTOR: &str = "[data-field=\"67c81d758da89225d90cf7cb\"] span";
pub const CITY_SELECTOR: &str = "[data-field=\"city\"] span";
pub const NAME_LINK_SELECTOR: &str = ".kt-user-card-v2__name";
pub const CELL_SELECTOR: &str = ".kt-datatable__cell";
pub const TABLE_CONTAINER_SELECTOR: &str = ".kt-datatable";

// class carried by our own label so re-runs can find and replace it
pub const LABEL_CLASS: &str = "transit-label";

// header row markers (compared lower-cased)
pub const STREET_HEADER_MARKER: &str = "dirección domicilio completa";
pub const CITY_HEADER_MARKER: &str = "ciudad";

// characters of each row kept in the change signature
pub const SIGNATURE_ROW_CHARS: usize = 100;
