/// Dataset names shared by stages, the persistence layer and the CLI.
/// Persisted artifacts follow the `{dataset_name}_latest` convention.

// Raw (bronze) datasets, one per source query
pub const EMPLOYEE_DATASET: &str = "dimemployee";
pub const DEPARTMENT_DATASET: &str = "dimdepartmentgroup";

// Silver dataset
pub const SILVER_EMPLOYEE_DATASET: &str = "employees";

// Metadata columns stamped by the pipeline itself
pub const EXTRACTION_TIMESTAMP: &str = "extraction_timestamp";
pub const TRANSFORMATION_TIMESTAMP: &str = "transformation_timestamp";

/// Field names of the employee source table and the columns derived from it
pub mod fields {
    pub const EMPLOYEE_KEY: &str = "EmployeeKey";
    pub const PARENT_EMPLOYEE_KEY: &str = "ParentEmployeeKey";
    pub const NATIONAL_ID: &str = "EmployeeNationalIDAlternateKey";
    pub const PARENT_NATIONAL_ID: &str = "ParentEmployeeNationalIDAlternateKey";
    pub const SALES_TERRITORY_KEY: &str = "SalesTerritoryKey";
    pub const FIRST_NAME: &str = "FirstName";
    pub const LAST_NAME: &str = "LastName";
    pub const MIDDLE_NAME: &str = "MiddleName";
    pub const NAME_STYLE: &str = "NameStyle";
    pub const TITLE: &str = "Title";
    pub const HIRE_DATE: &str = "HireDate";
    pub const BIRTH_DATE: &str = "BirthDate";
    pub const LOGIN_ID: &str = "LoginID";
    pub const EMAIL_ADDRESS: &str = "EmailAddress";
    pub const PHONE: &str = "Phone";
    pub const MARITAL_STATUS: &str = "MaritalStatus";
    pub const EMERGENCY_CONTACT_NAME: &str = "EmergencyContactName";
    pub const EMERGENCY_CONTACT_PHONE: &str = "EmergencyContactPhone";
    pub const SALARIED_FLAG: &str = "SalariedFlag";
    pub const GENDER: &str = "Gender";
    pub const PAY_FREQUENCY: &str = "PayFrequency";
    pub const BASE_RATE: &str = "BaseRate";
    pub const VACATION_HOURS: &str = "VacationHours";
    pub const SICK_LEAVE_HOURS: &str = "SickLeaveHours";
    pub const CURRENT_FLAG: &str = "CurrentFlag";
    pub const SALES_PERSON_FLAG: &str = "SalesPersonFlag";
    pub const DEPARTMENT_NAME: &str = "DepartmentName";
    pub const START_DATE: &str = "StartDate";
    pub const END_DATE: &str = "EndDate";
    pub const STATUS: &str = "Status";

    // Derived in the silver layer
    pub const FULL_NAME: &str = "FullName";
    pub const AGE: &str = "Age";
    pub const YEARS_OF_SERVICE: &str = "YearsOfService";
    pub const DATA_QUALITY_SCORE: &str = "DataQualityScore";

    // Organizational units
    pub const DEPARTMENT_GROUP_KEY: &str = "DepartmentGroupKey";
    pub const PARENT_DEPARTMENT_GROUP_KEY: &str = "ParentDepartmentGroupKey";
    pub const DEPARTMENT_GROUP_NAME: &str = "DepartmentGroupName";
}

/// Columns selected from the employee source table, in query order
pub const EMPLOYEE_COLUMNS: &[&str] = &[
    fields::EMPLOYEE_KEY,
    fields::PARENT_EMPLOYEE_KEY,
    fields::NATIONAL_ID,
    fields::PARENT_NATIONAL_ID,
    fields::SALES_TERRITORY_KEY,
    fields::FIRST_NAME,
    fields::LAST_NAME,
    fields::MIDDLE_NAME,
    fields::NAME_STYLE,
    fields::TITLE,
    fields::HIRE_DATE,
    fields::BIRTH_DATE,
    fields::LOGIN_ID,
    fields::EMAIL_ADDRESS,
    fields::PHONE,
    fields::MARITAL_STATUS,
    fields::EMERGENCY_CONTACT_NAME,
    fields::EMERGENCY_CONTACT_PHONE,
    fields::SALARIED_FLAG,
    fields::GENDER,
    fields::PAY_FREQUENCY,
    fields::BASE_RATE,
    fields::VACATION_HOURS,
    fields::SICK_LEAVE_HOURS,
    fields::CURRENT_FLAG,
    fields::SALES_PERSON_FLAG,
    fields::DEPARTMENT_NAME,
    fields::START_DATE,
    fields::END_DATE,
    fields::STATUS,
];

pub const DEPARTMENT_COLUMNS: &[&str] = &[
    fields::DEPARTMENT_GROUP_KEY,
    fields::PARENT_DEPARTMENT_GROUP_KEY,
    fields::DEPARTMENT_GROUP_NAME,
];

/// Columns appended by cleaning, in output order
pub const DERIVED_COLUMNS: &[&str] = &[
    fields::FULL_NAME,
    fields::AGE,
    fields::YEARS_OF_SERVICE,
    fields::DATA_QUALITY_SCORE,
    TRANSFORMATION_TIMESTAMP,
];

/// Contact fields whose absence lowers a record's data quality score
pub const CRITICAL_CONTACT_FIELDS: &[&str] = &[
    fields::EMAIL_ADDRESS,
    fields::PHONE,
    fields::DEPARTMENT_NAME,
];

/// Group label for records whose grouping value is missing
pub const UNKNOWN_GROUP: &str = "Unknown";
